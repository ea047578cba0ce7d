//! LRU cache of compiled wildcard patterns
//!
//! Every unquoted [`ExprPart`] is evaluated as a case-insensitive regex
//! against cached names; the same parts are evaluated over and over across
//! units and runs, so compiled patterns are kept around.

use crate::error::{GrupinError, Result};
use crate::expr::ExprPart;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of compiled patterns kept
pub const DEFAULT_PATTERN_CAPACITY: usize = 1024;

/// LRU cache of compiled patterns, shared between workers
pub struct PatternCache {
    cache: Mutex<LruCache<ExprPart, Arc<Regex>>>,
}

impl PatternCache {
    /// Create a new pattern cache with given capacity
    pub fn new(capacity: usize) -> Self {
        PatternCache {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Compiled pattern for a part, compiling on a miss
    pub fn get(&self, part: &ExprPart) -> Result<Arc<Regex>> {
        if let Some(re) = self.cache.lock().get(part) {
            return Ok(Arc::clone(re));
        }

        let source = part.regex_source();
        let re = Arc::new(
            Regex::new(&source)
                .map_err(|e| GrupinError::invalid_expression(&part.to_string(), e.to_string()))?,
        );
        self.cache.lock().put(part.clone(), Arc::clone(&re));
        Ok(re)
    }

    /// Whether a concrete name is matched by `part`
    pub fn matches(&self, part: &ExprPart, name: &str) -> Result<bool> {
        if part.is_quoted() {
            return Ok(part.value() == name);
        }
        if part.matches_everything() {
            return Ok(true);
        }
        Ok(self.get(part)?.is_match(name))
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CAPACITY)
    }
}
