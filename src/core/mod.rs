//! Grupin core
//!
//! - [`error`] - Error type shared by every layer
//! - [`validation`] - Identifiers for products, stages, interfaces and user groups
//! - [`expr`] - Dotted wildcard expressions and their set algebra
//! - [`matcher`] - Include/exclude sets of expressions, with templating
//! - [`declaration`] - The YAML model: products, interfaces, consumers
//! - [`backend`] - Platform listings and typed grant statements
//! - [`cache`] - Per-level account cache with drift invalidation
//! - [`matching`] - Evaluating matchers against the cache
//! - [`grants`] - Role naming, grant deltas and the reconciler
//! - [`usage`] - Matched-object usage records
//! - [`config`] - Environment-driven runtime settings

pub mod backend;
pub mod cache;
pub mod config;
pub mod declaration;
pub mod error;
pub mod expr;
pub mod grants;
pub mod matcher;
pub mod matching;
pub mod usage;
pub mod validation;
