//! Hierarchical metadata cache
//!
//! A process-wide, three-level cache of the platform's live object tree:
//! [`AccountCache`] (databases) → [`DatabaseCache`] (schemas) →
//! [`SchemaCache`] (tables and views).
//!
//! Each node carries its own version and its own `RwLock`. Callers pass the
//! version they last saw; a node refreshes when it was never loaded, when it
//! was invalidated, or when the caller has already seen its current version.
//! Concurrent callers holding the same `seen` value share one refresh.
//!
//! Locks are taken top-down and never held across levels: a listing is a
//! snapshot cloned under the shared lock, and descending into a child takes
//! only that child's lock.

mod levels;
mod node;

pub use levels::{AccountCache, DatabaseCache, Listing, ObjectInfo, SchemaCache, SchemaListing};
