//! Declaration model
//!
//! Raw YAML records are validated into [`Grupin`]: products with their
//! interfaces, consumption edges and the global user-group and producing
//! service registries. [`GrupinDiff`] compares two validated snapshots.

mod diff;
mod grupin;
mod product;
pub mod raw;

pub use diff::GrupinDiff;
pub use grupin::Grupin;
pub use product::{Classification, Interface, InterfaceRef, Product};
