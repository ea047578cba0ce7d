//! Evaluation of object matchers against the live cache

use super::PatternCache;
use crate::backend::Session;
use crate::cache::{AccountCache, ObjectInfo};
use crate::error::Result;
use crate::expr::{ExprPart, ObjExpr};
use crate::matcher::ObjMatcher;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Objects matched in one schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchedSchema {
    pub version: u64,
    pub tables: BTreeMap<String, ObjectInfo>,
    pub views: BTreeMap<String, ObjectInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchedDatabase {
    pub version: u64,
    pub schemas: BTreeMap<String, MatchedSchema>,
}

/// Objects matched by one include expression, minus its excludes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchedTree {
    pub account_version: u64,
    pub databases: BTreeMap<String, MatchedDatabase>,
}

impl MatchedTree {
    pub fn table_count(&self) -> usize {
        self.schemas().map(|(_, _, s)| s.tables.len()).sum()
    }

    pub fn view_count(&self) -> usize {
        self.schemas().map(|(_, _, s)| s.views.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// `(database, schema, objects)` for every matched schema.
    pub fn schemas(&self) -> impl Iterator<Item = (&str, &str, &MatchedSchema)> {
        self.databases.iter().flat_map(|(db, mdb)| {
            mdb.schemas
                .iter()
                .map(move |(s, ms)| (db.as_str(), s.as_str(), ms))
        })
    }
}

/// Result of evaluating a matcher, keyed by originating include expression
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchedObjects {
    pub trees: BTreeMap<ObjExpr, MatchedTree>,
}

impl MatchedObjects {
    /// Highest account version any tree was built from.
    pub fn account_version(&self) -> Option<u64> {
        self.trees.values().map(|t| t.account_version).max()
    }

    pub fn database_version(&self, database: &str) -> Option<u64> {
        self.trees
            .values()
            .filter_map(|t| t.databases.get(database).map(|d| d.version))
            .max()
    }

    pub fn schema_version(&self, database: &str, schema: &str) -> Option<u64> {
        self.trees
            .values()
            .filter_map(|t| {
                t.databases
                    .get(database)
                    .and_then(|d| d.schemas.get(schema))
                    .map(|s| s.version)
            })
            .max()
    }

    /// Databases with anything matched.
    pub fn databases(&self) -> BTreeSet<&str> {
        self.trees
            .values()
            .flat_map(|t| t.databases.keys().map(String::as_str))
            .collect()
    }

    pub fn tree(&self, include: &ObjExpr) -> Option<&MatchedTree> {
        self.trees.get(include)
    }

    pub fn table_count(&self) -> usize {
        self.trees.values().map(MatchedTree::table_count).sum()
    }

    pub fn view_count(&self) -> usize {
        self.trees.values().map(MatchedTree::view_count).sum()
    }
}

/// Evaluates matchers against a shared [`AccountCache`]
pub struct MatchingEngine {
    cache: Arc<AccountCache>,
    patterns: PatternCache,
}

impl MatchingEngine {
    pub fn new(cache: Arc<AccountCache>) -> Self {
        MatchingEngine {
            cache,
            patterns: PatternCache::default(),
        }
    }

    pub fn cache(&self) -> &Arc<AccountCache> {
        &self.cache
    }

    pub fn patterns(&self) -> &PatternCache {
        &self.patterns
    }

    /// Evaluate every include expression, then subtract each exclude from
    /// the tree of its unique superset include.
    ///
    /// `previous` is the caller's last result for the same matcher; cache
    /// levels it already saw at their current version are refreshed.
    pub fn evaluate(
        &self,
        session: &Session,
        matcher: &ObjMatcher,
        previous: Option<&MatchedObjects>,
    ) -> Result<MatchedObjects> {
        let mut trees = BTreeMap::new();
        for include in matcher.include().keys() {
            let tree = self.match_include(session, include, previous)?;
            trace!(
                include = %include,
                tables = tree.table_count(),
                views = tree.view_count(),
                "include matched"
            );
            trees.insert(include.clone(), tree);
        }

        for exclude in matcher.exclude().keys() {
            let Some(include) = matcher.superset_of(exclude) else {
                continue;
            };
            if let Some(tree) = trees.get_mut(include) {
                self.subtract(tree, exclude)?;
            }
        }

        let matched = MatchedObjects { trees };
        debug!(
            includes = matched.trees.len(),
            tables = matched.table_count(),
            views = matched.view_count(),
            "matcher evaluated"
        );
        Ok(matched)
    }

    fn select<'n, T>(
        &self,
        part: &ExprPart,
        entries: &'n BTreeMap<String, T>,
    ) -> Result<Vec<(&'n String, &'n T)>> {
        if part.is_quoted() {
            return Ok(entries.get_key_value(part.value()).into_iter().collect());
        }
        if part.matches_everything() {
            return Ok(entries.iter().collect());
        }
        let re = self.patterns.get(part)?;
        Ok(entries.iter().filter(|(name, _)| re.is_match(name)).collect())
    }

    fn select_objects(
        &self,
        part: &ExprPart,
        entries: &BTreeMap<String, ObjectInfo>,
    ) -> Result<BTreeMap<String, ObjectInfo>> {
        Ok(self
            .select(part, entries)?
            .into_iter()
            .map(|(name, info)| (name.clone(), info.clone()))
            .collect())
    }

    fn match_include(
        &self,
        session: &Session,
        include: &ObjExpr,
        previous: Option<&MatchedObjects>,
    ) -> Result<MatchedTree> {
        let dbs = self
            .cache
            .databases(session, previous.and_then(MatchedObjects::account_version))?;
        let mut tree = MatchedTree {
            account_version: dbs.version,
            databases: BTreeMap::new(),
        };

        for (db_name, db) in self.select(include.database(), &dbs.entries)? {
            let seen = previous.and_then(|p| p.database_version(db_name));
            let schemas = db.schemas(session, seen).map_err(|e| {
                if e.is_retryable() {
                    // The account listing still names a database we cannot see
                    self.cache.invalidate();
                }
                e
            })?;

            let mut matched_db = MatchedDatabase {
                version: schemas.version,
                schemas: BTreeMap::new(),
            };
            for (schema_name, schema) in self.select(include.schema(), &schemas.entries)? {
                let seen = previous.and_then(|p| p.schema_version(db_name, schema_name));
                let objects = schema.objects(session, seen).map_err(|e| {
                    if e.is_retryable() {
                        db.invalidate();
                    }
                    e
                })?;

                let matched_schema = MatchedSchema {
                    version: objects.version,
                    tables: self.select_objects(include.object(), &objects.tables)?,
                    views: self.select_objects(include.object(), &objects.views)?,
                };
                // Empty containers survive only when every part below is `*`
                let keep = include.object().matches_everything()
                    || !matched_schema.tables.is_empty()
                    || !matched_schema.views.is_empty();
                if keep {
                    matched_db.schemas.insert(schema_name.clone(), matched_schema);
                }
            }

            let keep = (include.schema().matches_everything()
                && include.object().matches_everything())
                || !matched_db.schemas.is_empty();
            if keep {
                tree.databases.insert(db_name.clone(), matched_db);
            }
        }

        Ok(tree)
    }

    /// Remove what `exclude` matches from one include's tree. Trailing `*`
    /// parts remove whole schemas or databases.
    fn subtract(&self, tree: &mut MatchedTree, exclude: &ObjExpr) -> Result<()> {
        let whole_schema = exclude.object().matches_everything();
        let whole_database = whole_schema && exclude.schema().matches_everything();

        let mut databases = Vec::new();
        for name in tree.databases.keys() {
            if self.patterns.matches(exclude.database(), name)? {
                databases.push(name.clone());
            }
        }

        for db_name in databases {
            if whole_database {
                tree.databases.remove(&db_name);
                continue;
            }
            let Some(db) = tree.databases.get_mut(&db_name) else {
                continue;
            };

            let mut schemas = Vec::new();
            for name in db.schemas.keys() {
                if self.patterns.matches(exclude.schema(), name)? {
                    schemas.push(name.clone());
                }
            }
            for schema_name in schemas {
                if whole_schema {
                    db.schemas.remove(&schema_name);
                    continue;
                }
                if let Some(schema) = db.schemas.get_mut(&schema_name) {
                    let object = exclude.object();
                    let mut failed = None;
                    for map in [&mut schema.tables, &mut schema.views] {
                        map.retain(|name, _| match self.patterns.matches(object, name) {
                            Ok(hit) => !hit,
                            Err(e) => {
                                failed.get_or_insert(e);
                                true
                            }
                        });
                    }
                    if let Some(e) = failed {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }
}
