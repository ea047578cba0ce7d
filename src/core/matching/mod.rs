//! Matching engine
//!
//! Evaluates an [`ObjMatcher`](crate::matcher::ObjMatcher) against the live
//! [`AccountCache`](crate::cache::AccountCache), level by level:
//!
//! 1. the database part against cached database names
//! 2. the schema part against each matched database's schemas
//! 3. the object part against tables and views, kept as separate namespaces
//!
//! Results are keyed by the include expression they came from. Excludes are
//! subtracted only from the tree of their own superset include.

mod engine;
mod pattern_cache;

pub use engine::{MatchedDatabase, MatchedObjects, MatchedSchema, MatchedTree, MatchingEngine};
pub use pattern_cache::{PatternCache, DEFAULT_PATTERN_CAPACITY};
