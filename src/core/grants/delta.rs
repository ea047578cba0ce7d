//! Grant delta computation
//!
//! For one database role, compare what the matched objects call for with
//! what the role holds. Live grants fall into three buckets:
//!
//! - satisfied: exactly what is desired
//! - revoke: outside the matcher's region, so the object is definitely not
//!   meant to be readable through this role
//! - untouched: inside the region but not in the matched set, which means
//!   the cache has not seen the object (yet); left alone until it has

use super::{FutureGrant, Grant, Mode, ObjectPath, ObjectType, Privilege};
use crate::expr::ObjExpr;
use crate::matcher::ObjMatcher;
use crate::matching::MatchedObjects;
use std::collections::{BTreeMap, BTreeSet};

type GrantKey = (Privilege, ObjectType, ObjectPath);
type FutureKey = (Privilege, ObjectType, Option<String>);

fn grant_key(g: &Grant) -> GrantKey {
    (g.privilege, g.on, g.path.clone())
}

fn future_key(g: &FutureGrant) -> FutureKey {
    (g.privilege, g.on, g.schema.clone())
}

/// What one database role should hold in one database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredGrants {
    pub grants: BTreeSet<Grant>,
    pub future: BTreeSet<FutureGrant>,
}

impl DesiredGrants {
    /// Grants for `role` in `database` given the unit's matched objects.
    ///
    /// USAGE on the database and every matched schema, SELECT on every
    /// matched table and view. Future grants cover containers the matcher
    /// owns entirely: a whole database when an include is `db.*.*` with
    /// nothing carved out of it there, otherwise each matched schema whose
    /// include ends in `*` and has no exclude inside that schema.
    pub fn compute(
        role: &str,
        database: &str,
        mode: Mode,
        matcher: &ObjMatcher,
        matched: &MatchedObjects,
    ) -> Self {
        let mut desired = DesiredGrants::default();
        let mut schemas: BTreeSet<&str> = BTreeSet::new();

        for tree in matched.trees.values() {
            let Some(db) = tree.databases.get(database) else {
                continue;
            };
            desired.grants.insert(Grant::new(
                mode.privilege_on(ObjectType::Database),
                ObjectType::Database,
                ObjectPath::database(database),
                role,
            ));
            for (schema, objects) in &db.schemas {
                schemas.insert(schema);
                desired.grants.insert(Grant::new(
                    mode.privilege_on(ObjectType::Schema),
                    ObjectType::Schema,
                    ObjectPath::schema(database, schema.as_str()),
                    role,
                ));
                for (on, names) in [
                    (ObjectType::Table, &objects.tables),
                    (ObjectType::View, &objects.views),
                ] {
                    for name in names.keys() {
                        desired.grants.insert(Grant::new(
                            mode.privilege_on(on),
                            on,
                            ObjectPath::object(database, schema.as_str(), name.as_str()),
                            role,
                        ));
                    }
                }
            }
        }

        if desired.grants.is_empty() {
            return desired;
        }

        let future = |on: ObjectType, schema: Option<&str>| FutureGrant {
            privilege: mode.privilege_on(on),
            on,
            database: database.to_string(),
            schema: schema.map(str::to_string),
            role: role.to_string(),
        };
        if future_database_eligible(matcher, database) {
            desired.future.insert(future(ObjectType::Schema, None));
            desired.future.insert(future(ObjectType::Table, None));
            desired.future.insert(future(ObjectType::View, None));
        } else {
            for schema in schemas {
                if future_schema_eligible(matcher, database, schema) {
                    desired.future.insert(future(ObjectType::Table, Some(schema)));
                    desired.future.insert(future(ObjectType::View, Some(schema)));
                }
            }
        }
        desired
    }
}

/// Corrective statements for one database role
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantDelta {
    pub grant: Vec<Grant>,
    pub revoke: Vec<Grant>,
    pub grant_future: Vec<FutureGrant>,
    pub revoke_future: Vec<FutureGrant>,
    /// Live grants already matching the desired state
    pub satisfied: usize,
    /// Live grants inside the region on objects the cache has not seen
    pub untouched: usize,
}

impl GrantDelta {
    /// Classify live grants against the desired ones.
    pub fn compute(
        desired: &DesiredGrants,
        live: &[Grant],
        live_future: &[FutureGrant],
        mode: Mode,
        database: &str,
        matcher: &ObjMatcher,
    ) -> Self {
        let mut delta = GrantDelta::default();

        let live_keys: BTreeSet<GrantKey> = live.iter().map(grant_key).collect();
        let desired_keys: BTreeMap<GrantKey, &Grant> =
            desired.grants.iter().map(|g| (grant_key(g), g)).collect();

        for g in live {
            if desired_keys.contains_key(&grant_key(g)) {
                delta.satisfied += 1;
            } else if g.privilege == mode.privilege_on(g.on) && grant_covered(matcher, &g.path) {
                delta.untouched += 1;
            } else {
                delta.revoke.push(g.clone());
            }
        }
        delta.grant = desired_keys
            .iter()
            .filter(|(k, _)| !live_keys.contains(*k))
            .map(|(_, g)| (*g).clone())
            .collect();

        let live_future_keys: BTreeSet<FutureKey> = live_future.iter().map(future_key).collect();
        let desired_future: BTreeMap<FutureKey, &FutureGrant> =
            desired.future.iter().map(|g| (future_key(g), g)).collect();

        for g in live_future {
            if desired_future.contains_key(&future_key(g)) {
                delta.satisfied += 1;
            } else if g.privilege == mode.privilege_on(g.on)
                && future_covered(matcher, database, g.on, g.schema.as_deref())
            {
                delta.untouched += 1;
            } else {
                delta.revoke_future.push(g.clone());
            }
        }
        delta.grant_future = desired_future
            .iter()
            .filter(|(k, _)| !live_future_keys.contains(*k))
            .map(|(_, g)| (*g).clone())
            .collect();

        delta
    }

    pub fn is_empty(&self) -> bool {
        self.grant.is_empty()
            && self.revoke.is_empty()
            && self.grant_future.is_empty()
            && self.revoke_future.is_empty()
    }

    pub fn granted(&self) -> usize {
        self.grant.len() + self.grant_future.len()
    }

    pub fn revoked(&self) -> usize {
        self.revoke.len() + self.revoke_future.len()
    }
}

fn carves_database(x: &ObjExpr, database: &str) -> bool {
    x.database().matches(database)
        && x.schema().matches_everything()
        && x.object().matches_everything()
}

fn carves_schema(x: &ObjExpr, database: &str, schema: &str) -> bool {
    x.database().matches(database) && x.schema().matches(schema) && x.object().matches_everything()
}

/// Whether an object path lies inside the matcher's region. Databases and
/// schemas count as inside unless an exclude removes them whole.
pub fn grant_covered(matcher: &ObjMatcher, path: &ObjectPath) -> bool {
    match (&path.schema, &path.object) {
        (None, _) => matcher.include().keys().any(|inc| {
            inc.database().matches(&path.database)
                && !matcher
                    .excludes_of(inc)
                    .any(|x| carves_database(x, &path.database))
        }),
        (Some(schema), None) => matcher.include().keys().any(|inc| {
            inc.database().matches(&path.database)
                && inc.schema().matches(schema)
                && !matcher
                    .excludes_of(inc)
                    .any(|x| carves_schema(x, &path.database, schema))
        }),
        (Some(_), Some(_)) => matcher.covers(&path.names()),
    }
}

fn future_database_eligible(matcher: &ObjMatcher, database: &str) -> bool {
    matcher.include().keys().any(|inc| {
        inc.database().matches(database)
            && inc.schema().matches_everything()
            && inc.object().matches_everything()
            && !matcher
                .excludes_of(inc)
                .any(|x| x.database().matches(database))
    })
}

fn future_schema_eligible(matcher: &ObjMatcher, database: &str, schema: &str) -> bool {
    matcher.include().keys().any(|inc| {
        inc.database().matches(database)
            && inc.schema().matches(schema)
            && inc.object().matches_everything()
            && !matcher
                .excludes_of(inc)
                .any(|x| x.database().matches(database) && x.schema().matches(schema))
    })
}

/// Whether a live future grant is one the matcher could call for.
fn future_covered(
    matcher: &ObjMatcher,
    database: &str,
    on: ObjectType,
    schema: Option<&str>,
) -> bool {
    match (schema, on) {
        (None, ObjectType::Schema | ObjectType::Table | ObjectType::View) => {
            future_database_eligible(matcher, database)
        }
        (Some(schema), ObjectType::Table | ObjectType::View) => {
            future_schema_eligible(matcher, database, schema)
        }
        _ => false,
    }
}
