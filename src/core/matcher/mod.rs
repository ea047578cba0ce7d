//! Matcher construction
//!
//! Turns raw string expressions plus deployment-stage and user-group context
//! into validated [`Matcher`]s:
//! - `[dtap]` / `[user_group]` placeholders are expanded per registered stage
//!   or group and each rendering is attributed ([`ExprAttr`])
//! - includes and excludes are each pairwise disjoint
//! - each exclude maps to the unique include it is carved out of

mod attr;
#[allow(clippy::module_inception)]
mod matcher;
mod template;

pub use attr::{DtapSpec, ExprAttr};
pub use matcher::{ColumnMatcher, Matcher, ObjMatcher};
pub use template::{render, TemplateContext, DTAP_PLACEHOLDER, USER_GROUP_PLACEHOLDER};

#[cfg(test)]
mod tests;
