//! Expression algebra over the warehouse namespace
//!
//! Provides:
//! - [`ExprPart`]: one wildcard- and quoting-aware name component
//! - [`ObjExpr`] / [`ColumnExpr`]: 3- and 4-level hierarchical expressions
//! - Subset, disjointness and intersection predicates lifted position-wise
//!
//! Wildcards are suffix-only (`sales*`), which keeps the algebra closed:
//! two components are either nested or disjoint, never partially overlapping.

mod expression;
mod parse;
mod part;

pub use expression::{all_disjoint, find_overlap, ColumnExpr, Expression, ObjExpr};
pub use part::ExprPart;

pub(crate) use parse::split_components;
