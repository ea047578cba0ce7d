//! One versioned, lock-guarded cache level

use crate::error::Result;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::BTreeMap;

#[derive(Debug)]
pub(crate) struct Entry<T> {
    pub value: T,
    pub dropped: bool,
}

/// Children of one cache node
///
/// `version` is 0 until the first refresh and grows by one per refresh.
/// Children that disappear are flagged `dropped` instead of removed, so a
/// re-created child keeps its node (and its identity) across the churn.
#[derive(Debug)]
pub(crate) struct Node<K, T> {
    pub version: u64,
    pub stale: bool,
    pub children: BTreeMap<K, Entry<T>>,
}

impl<K, T> Default for Node<K, T> {
    fn default() -> Self {
        Node {
            version: 0,
            stale: false,
            children: BTreeMap::new(),
        }
    }
}

/// What a refresh did, for logging
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefreshStats {
    pub added: usize,
    pub dropped: usize,
    pub recreated: usize,
}

impl<K: Ord + Clone, T> Node<K, T> {
    /// A caller that has already seen the current version asks for a newer one.
    pub fn needs_refresh(&self, seen: Option<u64>) -> bool {
        self.version == 0 || self.stale || seen.is_some_and(|s| s >= self.version)
    }

    /// Replace the child set with a complete fresh listing.
    pub fn apply<R>(
        &mut self,
        fresh: Vec<(K, R)>,
        mut create: impl FnMut(&K, R) -> T,
        mut update: impl FnMut(&mut T, R, bool),
    ) -> RefreshStats {
        let mut stats = RefreshStats::default();
        let mut present: BTreeMap<K, R> = fresh.into_iter().collect();

        for (key, entry) in self.children.iter_mut() {
            match present.remove(key) {
                Some(row) => {
                    let recreated = entry.dropped;
                    if recreated {
                        stats.recreated += 1;
                    }
                    entry.dropped = false;
                    update(&mut entry.value, row, recreated);
                }
                None if !entry.dropped => {
                    entry.dropped = true;
                    stats.dropped += 1;
                }
                None => {}
            }
        }

        for (key, row) in present {
            let value = create(&key, row);
            self.children.insert(
                key,
                Entry {
                    value,
                    dropped: false,
                },
            );
            stats.added += 1;
        }

        self.version += 1;
        self.stale = false;
        stats
    }

    pub fn live(&self) -> impl Iterator<Item = (&K, &T)> {
        self.children
            .iter()
            .filter(|(_, e)| !e.dropped)
            .map(|(k, e)| (k, &e.value))
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.children
            .get(key)
            .filter(|e| !e.dropped)
            .map(|e| &e.value)
    }
}

/// Make sure a node is fresh relative to `seen`, then hand out a shared guard.
///
/// Fresh nodes are served under the shared lock. Otherwise the exclusive
/// lock is taken for the whole backend round trip and downgraded once the
/// listing is applied. The listing is fetched completely before anything is
/// written, so a failed or cancelled fetch leaves the node as it was.
pub(crate) fn ensure_fresh<'l, K, T, R>(
    lock: &'l RwLock<Node<K, T>>,
    seen: Option<u64>,
    fetch: impl FnOnce() -> Result<Vec<(K, R)>>,
    create: impl FnMut(&K, R) -> T,
    update: impl FnMut(&mut T, R, bool),
) -> Result<(RwLockReadGuard<'l, Node<K, T>>, Option<RefreshStats>)>
where
    K: Ord + Clone,
{
    let guard = lock.read();
    if !guard.needs_refresh(seen) {
        return Ok((guard, None));
    }
    drop(guard);

    let mut guard = lock.write();
    // Another writer may have refreshed while we waited
    if !guard.needs_refresh(seen) {
        return Ok((RwLockWriteGuard::downgrade(guard), None));
    }
    let fresh = fetch()?;
    let stats = guard.apply(fresh, create, update);
    Ok((RwLockWriteGuard::downgrade(guard), Some(stats)))
}
