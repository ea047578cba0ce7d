//! Privilege reconciliation
//!
//! - [`privilege`]: closed `Mode` × `Privilege` × `ObjectType` enums
//! - [`Grant`] / [`FutureGrant`] on concrete [`ObjectPath`]s
//! - [`RoleNaming`]: deterministic, parseable role identities
//! - [`DesiredGrants`] / [`GrantDelta`]: what a role should hold versus
//!   what it holds
//! - [`Reconciler`]: per-unit state machine with drift retry, run on a
//!   worker pool

mod delta;
mod grant;
pub mod privilege;
mod reconcile;
mod role;

pub use delta::{grant_covered, DesiredGrants, GrantDelta};
pub use grant::{FutureGrant, Grant, ObjectPath};
pub use privilege::{Mode, ObjectType, Privilege};
pub use reconcile::{ReconcileReport, ReconcileUnit, Reconciler, UnitOutcome};
pub use role::{AccountRole, DatabaseRole, RoleNaming};
