//! # Grupin - Data Product Access Management
//!
//! `grupin-rs` turns a YAML declaration of data products into read grants
//! on a warehouse. Every product owns a set of databases, schemas, tables
//! and views described by dotted wildcard expressions; other products
//! consume its interfaces. The reconciler keeps one database role per
//! `(product, stage, interface)` holding exactly the grants the
//! declaration implies.
//!
//! - **Expressions** with containment, overlap and subtraction
//! - **Matchers**: include/exclude sets, templated per stage and user group
//! - **Declarations** validated for ownership partitioning and dangling references
//! - **Account cache** with per-level drift invalidation
//! - **Reconciler**: grant deltas, batched statements, retry with backoff
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grupin_rs::backend::{memory::MemoryPlatform, Session};
//! use grupin_rs::{Config, Grupin, Reconciler, Result, RoleNaming};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let grupin = Grupin::from_yaml_file("grupin.yaml")?;
//!
//! let platform = Arc::new(MemoryPlatform::new());
//! platform.add_table("SALES", "MART", "DAILY");
//!
//! let config = Config::new(RoleNaming::new("grp_", "if_")?);
//! let reconciler = Reconciler::new(config, Session::new(platform));
//! let report = reconciler.reconcile_all(&grupin)?;
//!
//! for outcome in report.failed() {
//!     eprintln!("{}: {:?}", outcome.unit, outcome.result);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Expressions
//!
//! ```rust
//! use grupin_rs::{Expression, ObjExpr};
//!
//! # fn main() -> grupin_rs::Result<()> {
//! let wide: ObjExpr = "sales.*.*".parse()?;
//! let narrow: ObjExpr = "sales.mart.daily".parse()?;
//! assert!(narrow.subset_of(&wide));
//! assert!(!wide.disjoint(&narrow));
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use core::{
    backend, cache, config, declaration, error, expr, grants, matcher, matching, usage, validation,
};

pub use crate::core::{
    backend::{CancelToken, Platform, Session, Statement},
    cache::AccountCache,
    config::Config,
    declaration::{Classification, Grupin, GrupinDiff, Interface, InterfaceRef, Product},
    error::{GrupinError, Result},
    expr::{ColumnExpr, ExprPart, Expression, ObjExpr},
    grants::{
        DatabaseRole, GrantDelta, Mode, ReconcileReport, ReconcileUnit, Reconciler, RoleNaming,
        UnitOutcome,
    },
    matcher::{ColumnMatcher, DtapSpec, ExprAttr, ObjMatcher, TemplateContext},
    matching::{MatchedObjects, MatchingEngine},
    usage::UsageRecord,
    validation::Identifier,
};
