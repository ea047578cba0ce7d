//! Account, database and schema levels

use super::node::{ensure_fresh, Node, RefreshStats};
use crate::backend::{ObjectKind, Platform, Session};
use crate::error::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Snapshot of one level's live children
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub version: u64,
    pub entries: BTreeMap<String, T>,
}

/// Cached facts about one table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// Snapshot of one schema; tables and views are separate namespaces
#[derive(Debug, Clone, Default)]
pub struct SchemaListing {
    pub version: u64,
    pub tables: BTreeMap<String, ObjectInfo>,
    pub views: BTreeMap<String, ObjectInfo>,
}

fn log_refresh(level: &str, path: &str, version: u64, stats: Option<RefreshStats>) {
    if let Some(stats) = stats {
        debug!(
            node = level,
            path,
            version,
            added = stats.added,
            dropped = stats.dropped,
            recreated = stats.recreated,
            "cache refreshed"
        );
    }
}

/// Root of the cache: the databases visible to the session's role
#[derive(Debug, Default)]
pub struct AccountCache {
    node: RwLock<Node<String, Arc<DatabaseCache>>>,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live databases, refreshed first when unloaded, stale, or already seen
    /// at the current version.
    pub fn databases(
        &self,
        session: &Session,
        seen: Option<u64>,
    ) -> Result<Listing<Arc<DatabaseCache>>> {
        let (guard, stats) = ensure_fresh(
            &self.node,
            seen,
            || -> Result<Vec<(String, ())>> {
                session
                    .databases()?
                    .map(|name| name.map(|n| (n, ())))
                    .collect()
            },
            |name, ()| Arc::new(DatabaseCache::new(name)),
            |db, (), recreated| {
                if recreated {
                    db.invalidate_subtree();
                }
            },
        )?;
        log_refresh("account", "", guard.version, stats);

        Ok(Listing {
            version: guard.version,
            entries: guard
                .live()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect(),
        })
    }

    /// A live database node, without touching the platform.
    pub fn database(&self, name: &str) -> Option<Arc<DatabaseCache>> {
        self.node.read().get(&name.to_string()).cloned()
    }

    pub fn version(&self) -> u64 {
        self.node.read().version
    }

    /// Force a refresh on next access.
    pub fn invalidate(&self) {
        self.node.write().stale = true;
    }

    /// Invalidate every level below the account as well.
    pub fn invalidate_subtree(&self) {
        let mut node = self.node.write();
        node.stale = true;
        for entry in node.children.values() {
            entry.value.invalidate_subtree();
        }
    }
}

/// Schemas of one database
#[derive(Debug)]
pub struct DatabaseCache {
    name: String,
    node: RwLock<Node<String, Arc<SchemaCache>>>,
}

impl DatabaseCache {
    fn new(name: &str) -> Self {
        DatabaseCache {
            name: name.to_string(),
            node: RwLock::new(Node::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schemas(
        &self,
        session: &Session,
        seen: Option<u64>,
    ) -> Result<Listing<Arc<SchemaCache>>> {
        let (guard, stats) = ensure_fresh(
            &self.node,
            seen,
            || -> Result<Vec<(String, ())>> {
                session
                    .schemas(&self.name)?
                    .map(|name| name.map(|n| (n, ())))
                    .collect()
            },
            |name, ()| Arc::new(SchemaCache::new(&self.name, name)),
            |schema, (), recreated| {
                if recreated {
                    schema.invalidate();
                }
            },
        )?;
        log_refresh("database", &self.name, guard.version, stats);

        Ok(Listing {
            version: guard.version,
            entries: guard
                .live()
                .map(|(k, v)| (k.clone(), Arc::clone(v)))
                .collect(),
        })
    }

    pub fn schema(&self, name: &str) -> Option<Arc<SchemaCache>> {
        self.node.read().get(&name.to_string()).cloned()
    }

    pub fn version(&self) -> u64 {
        self.node.read().version
    }

    pub fn invalidate(&self) {
        self.node.write().stale = true;
    }

    /// Invalidate this database and every schema under it.
    pub fn invalidate_subtree(&self) {
        let mut node = self.node.write();
        node.stale = true;
        for entry in node.children.values() {
            entry.value.invalidate();
        }
    }
}

/// Tables and views of one schema
#[derive(Debug)]
pub struct SchemaCache {
    database: String,
    name: String,
    node: RwLock<Node<(ObjectKind, String), ObjectInfo>>,
}

impl SchemaCache {
    fn new(database: &str, name: &str) -> Self {
        SchemaCache {
            database: database.to_string(),
            name: name.to_string(),
            node: RwLock::new(Node::default()),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objects(&self, session: &Session, seen: Option<u64>) -> Result<SchemaListing> {
        let (guard, stats) = ensure_fresh(
            &self.node,
            seen,
            || -> Result<Vec<((ObjectKind, String), Option<String>)>> {
                session
                    .objects(&self.database, &self.name)?
                    .map(|row| row.map(|r| ((r.kind, r.name), r.owner)))
                    .collect()
            },
            |_, owner| ObjectInfo { owner },
            |info, owner, _| info.owner = owner,
        )?;
        if stats.is_some() {
            let path = format!("{}.{}", self.database, self.name);
            log_refresh("schema", &path, guard.version, stats);
        }

        let mut listing = SchemaListing {
            version: guard.version,
            ..Default::default()
        };
        for ((kind, name), info) in guard.live() {
            let target = match kind {
                ObjectKind::Table => &mut listing.tables,
                ObjectKind::View => &mut listing.views,
            };
            target.insert(name.clone(), info.clone());
        }
        Ok(listing)
    }

    pub fn version(&self) -> u64 {
        self.node.read().version
    }

    pub fn invalidate(&self) {
        self.node.write().stale = true;
    }
}
