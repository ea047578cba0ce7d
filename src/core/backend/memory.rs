//! In-process platform
//!
//! Keeps a small warehouse in memory: databases, schemas, tables and views,
//! database and account roles, and the grants between them. Statements are
//! applied from their typed form. Faults can be injected per call to
//! simulate drift ("does not exist or not authorized") and I/O failures.
//!
//! Unquoted role names are stored upper-cased, like the real platform does.

use super::{ObjectKind, ObjectRow, Platform, RowStream, Statement};
use crate::error::{GrupinError, Result, NOT_FOUND_OR_UNAUTHORIZED_CODE};
use crate::grants::{FutureGrant, Grant, ObjectPath, ObjectType};
use crate::usage::UsageRecord;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// A platform call, as recorded and as matched by injected faults
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    Databases,
    Schemas(String),
    Objects(String, String),
    DatabaseRoles(String),
    GrantsTo(String, String),
    FutureGrantsTo(String, String),
    GrantsOf(String, String),
    Execute,
}

#[derive(Debug)]
struct Fault {
    op: Op,
    code: i64,
    remaining: u32,
}

#[derive(Debug, Default)]
struct Role {
    grants: BTreeSet<Grant>,
    future: BTreeSet<FutureGrant>,
    granted_to: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Schema {
    objects: BTreeMap<(ObjectKind, String), Option<String>>,
}

#[derive(Debug, Default)]
struct Database {
    schemas: BTreeMap<String, Schema>,
    roles: BTreeMap<String, Role>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, Database>,
    account_roles: BTreeSet<String>,
    usage: Vec<(String, UsageRecord)>,
    faults: Vec<Fault>,
    calls: Vec<Op>,
    executed: Vec<Statement>,
}

fn not_found(what: impl std::fmt::Display) -> GrupinError {
    GrupinError::from_sql(
        NOT_FOUND_OR_UNAUTHORIZED_CODE,
        format!("{} does not exist or not authorized.", what),
    )
}

fn role_key(role: &str) -> String {
    role.to_uppercase()
}

impl State {
    fn enter(&mut self, op: Op) -> Result<()> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0)
            .map(|f| {
                f.remaining -= 1;
                f.code
            });
        self.faults.retain(|f| f.remaining > 0);
        self.calls.push(op.clone());

        match fault {
            Some(code) => Err(GrupinError::from_sql(code, format!("injected fault on {:?}", op))),
            None => Ok(()),
        }
    }

    fn database(&self, name: &str) -> Result<&Database> {
        self.databases
            .get(name)
            .ok_or_else(|| not_found(format!("Database '{}'", name)))
    }

    fn database_mut(&mut self, name: &str) -> Result<&mut Database> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| not_found(format!("Database '{}'", name)))
    }

    fn role(&self, database: &str, role: &str) -> Result<&Role> {
        self.database(database)?
            .roles
            .get(&role_key(role))
            .ok_or_else(|| not_found(format!("Database role '{}.{}'", database, role)))
    }

    fn role_mut(&mut self, database: &str, role: &str) -> Result<&mut Role> {
        self.database_mut(database)?
            .roles
            .get_mut(&role_key(role))
            .ok_or_else(|| not_found(format!("Database role '{}.{}'", database, role)))
    }

    fn check_exists(&self, on: ObjectType, path: &ObjectPath) -> Result<()> {
        let db = self.database(&path.database)?;
        let schema = match &path.schema {
            Some(s) => Some(
                db.schemas
                    .get(s)
                    .ok_or_else(|| not_found(format!("Schema '{}'", path)))?,
            ),
            None => None,
        };
        let kind = match on {
            ObjectType::Table => Some(ObjectKind::Table),
            ObjectType::View => Some(ObjectKind::View),
            ObjectType::Database | ObjectType::Schema => None,
        };
        match (kind, schema, &path.object) {
            (Some(kind), Some(schema), Some(object)) => {
                if schema.objects.contains_key(&(kind, object.clone())) {
                    Ok(())
                } else {
                    Err(not_found(format!("{} '{}'", on, path)))
                }
            }
            (None, _, None) if path.depth() == on.depth() => Ok(()),
            _ => Err(GrupinError::Sql {
                code: 1003,
                message: format!("malformed {} path '{}'", on, path),
            }),
        }
    }

    fn apply(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::CreateDatabaseRole { database, role } => {
                self.database_mut(database)?
                    .roles
                    .entry(role_key(role))
                    .or_default();
            }
            Statement::CreateAccountRole { role } => {
                self.account_roles.insert(role_key(role));
            }
            Statement::Grant(g) => {
                self.check_exists(g.on, &g.path)?;
                let mut g = g.clone();
                g.role = role_key(&g.role);
                self.role_mut(&g.path.database, &g.role)?.grants.insert(g);
            }
            Statement::Revoke(g) => {
                self.check_exists(g.on, &g.path)?;
                self.role_mut(&g.path.database, &g.role)?
                    .grants
                    .retain(|held| !held.same_target(g));
            }
            Statement::GrantFuture(fg) => {
                let container = match &fg.schema {
                    Some(s) => ObjectPath::schema(fg.database.clone(), s.clone()),
                    None => ObjectPath::database(fg.database.clone()),
                };
                let on = if fg.schema.is_some() {
                    ObjectType::Schema
                } else {
                    ObjectType::Database
                };
                self.check_exists(on, &container)?;
                let mut fg = fg.clone();
                fg.role = role_key(&fg.role);
                self.role_mut(&fg.database, &fg.role)?.future.insert(fg);
            }
            Statement::RevokeFuture(fg) => {
                self.role_mut(&fg.database, &fg.role)?
                    .future
                    .retain(|held| !held.same_target(fg));
            }
            Statement::GrantDatabaseRole { database, role, to } => {
                if !self.account_roles.contains(&role_key(to)) {
                    return Err(not_found(format!("Role '{}'", to)));
                }
                self.role_mut(database, role)?.granted_to.insert(role_key(to));
            }
            Statement::RevokeDatabaseRole {
                database,
                role,
                from,
            } => {
                self.role_mut(database, role)?
                    .granted_to
                    .remove(&role_key(from));
            }
            Statement::InsertUsage { table, record } => {
                self.usage.push((table.clone(), record.clone()));
            }
        }
        Ok(())
    }

    /// Future grants fire for objects created after them.
    fn apply_future_grants(&mut self, database: &str, schema: &str, created: Option<(ObjectKind, &str)>) {
        let Some(db) = self.databases.get_mut(database) else {
            return;
        };
        for role in db.roles.values_mut() {
            let mut fired = Vec::new();
            for fg in &role.future {
                match created {
                    None if fg.on == ObjectType::Schema && fg.schema.is_none() => {
                        fired.push(Grant::new(
                            fg.privilege,
                            ObjectType::Schema,
                            ObjectPath::schema(database, schema),
                            &fg.role,
                        ));
                    }
                    Some((kind, name)) => {
                        let on = match kind {
                            ObjectKind::Table => ObjectType::Table,
                            ObjectKind::View => ObjectType::View,
                        };
                        let in_scope = fg.schema.as_deref().map_or(true, |s| s == schema);
                        if fg.on == on && in_scope {
                            fired.push(Grant::new(
                                fg.privilege,
                                on,
                                ObjectPath::object(database, schema, name),
                                &fg.role,
                            ));
                        }
                    }
                    None => {}
                }
            }
            role.grants.extend(fired);
        }
    }
}

/// In-memory [`Platform`] for tests and local dry runs
#[derive(Debug, Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database(&self, database: &str) {
        self.state
            .lock()
            .databases
            .entry(database.to_string())
            .or_default();
    }

    /// Create a schema (and its database if needed).
    pub fn add_schema(&self, database: &str, schema: &str) {
        let mut state = self.state.lock();
        let created = !state
            .databases
            .entry(database.to_string())
            .or_default()
            .schemas
            .contains_key(schema);
        if created {
            if let Some(db) = state.databases.get_mut(database) {
                db.schemas.insert(schema.to_string(), Schema::default());
            }
            state.apply_future_grants(database, schema, None);
        }
    }

    pub fn add_table(&self, database: &str, schema: &str, table: &str) {
        self.add_object(database, schema, table, ObjectKind::Table, None);
    }

    pub fn add_view(&self, database: &str, schema: &str, view: &str) {
        self.add_object(database, schema, view, ObjectKind::View, None);
    }

    /// Create an object (and its schema and database if needed).
    pub fn add_object(
        &self,
        database: &str,
        schema: &str,
        name: &str,
        kind: ObjectKind,
        owner: Option<&str>,
    ) {
        self.add_schema(database, schema);
        let mut state = self.state.lock();
        if let Some(s) = state
            .databases
            .get_mut(database)
            .and_then(|db| db.schemas.get_mut(schema))
        {
            s.objects
                .insert((kind, name.to_string()), owner.map(str::to_string));
        }
        state.apply_future_grants(database, schema, Some((kind, name)));
    }

    /// Drop a database with everything in it, roles included.
    pub fn drop_database(&self, database: &str) {
        self.state.lock().databases.remove(database);
    }

    /// Drop a schema; grants on it and its objects go with it.
    pub fn drop_schema(&self, database: &str, schema: &str) {
        let mut state = self.state.lock();
        if let Some(db) = state.databases.get_mut(database) {
            db.schemas.remove(schema);
            for role in db.roles.values_mut() {
                role.grants
                    .retain(|g| g.path.schema.as_deref() != Some(schema));
                role.future
                    .retain(|fg| fg.schema.as_deref() != Some(schema));
            }
        }
    }

    pub fn drop_object(&self, database: &str, schema: &str, name: &str) {
        let mut state = self.state.lock();
        if let Some(db) = state.databases.get_mut(database) {
            if let Some(s) = db.schemas.get_mut(schema) {
                s.objects.retain(|(_, n), _| n != name);
            }
            for role in db.roles.values_mut() {
                role.grants.retain(|g| {
                    !(g.path.schema.as_deref() == Some(schema) && g.path.object.as_deref() == Some(name))
                });
            }
        }
    }

    pub fn add_account_role(&self, role: &str) {
        self.state.lock().account_roles.insert(role_key(role));
    }

    pub fn has_account_role(&self, role: &str) -> bool {
        self.state.lock().account_roles.contains(&role_key(role))
    }

    /// Fail the next `times` calls matching `op` with a platform error code.
    pub fn fail_next(&self, op: Op, code: i64, times: u32) {
        if times > 0 {
            self.state.lock().faults.push(Fault {
                op,
                code,
                remaining: times,
            });
        }
    }

    /// Fail the next `times` calls matching `op` as drift.
    pub fn drift_next(&self, op: Op, times: u32) {
        self.fail_next(op, NOT_FOUND_OR_UNAUTHORIZED_CODE, times);
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &Op) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    /// Statements applied so far, in order.
    pub fn executed(&self) -> Vec<Statement> {
        self.state.lock().executed.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.calls.clear();
        state.executed.clear();
    }

    pub fn database_role_names(&self, database: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(database)
            .map(|db| db.roles.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Current grants held by a database role.
    pub fn held_grants(&self, database: &str, role: &str) -> Vec<Grant> {
        self.state
            .lock()
            .role(database, role)
            .map(|r| r.grants.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn held_future_grants(&self, database: &str, role: &str) -> Vec<FutureGrant> {
        self.state
            .lock()
            .role(database, role)
            .map(|r| r.future.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Account roles a database role is granted to.
    pub fn grantees(&self, database: &str, role: &str) -> Vec<String> {
        self.state
            .lock()
            .role(database, role)
            .map(|r| r.granted_to.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn usage_rows(&self) -> Vec<(String, UsageRecord)> {
        self.state.lock().usage.clone()
    }
}

fn stream<'a, T: Send + 'a>(rows: Vec<T>) -> RowStream<'a, T> {
    Box::new(rows.into_iter().map(Ok))
}

impl Platform for MemoryPlatform {
    fn databases(&self) -> Result<RowStream<'_, String>> {
        let mut state = self.state.lock();
        state.enter(Op::Databases)?;
        Ok(stream(state.databases.keys().cloned().collect()))
    }

    fn schemas(&self, database: &str) -> Result<RowStream<'_, String>> {
        let mut state = self.state.lock();
        state.enter(Op::Schemas(database.to_string()))?;
        Ok(stream(state.database(database)?.schemas.keys().cloned().collect()))
    }

    fn objects(&self, database: &str, schema: &str) -> Result<RowStream<'_, ObjectRow>> {
        let mut state = self.state.lock();
        state.enter(Op::Objects(database.to_string(), schema.to_string()))?;
        let s = state
            .database(database)?
            .schemas
            .get(schema)
            .ok_or_else(|| not_found(format!("Schema '{}.{}'", database, schema)))?;
        let rows: Vec<ObjectRow> = s
            .objects
            .iter()
            .map(|((kind, name), owner)| ObjectRow {
                name: name.clone(),
                kind: *kind,
                owner: owner.clone(),
            })
            .collect();
        Ok(stream(rows))
    }

    fn database_roles(&self, database: &str) -> Result<RowStream<'_, String>> {
        let mut state = self.state.lock();
        state.enter(Op::DatabaseRoles(database.to_string()))?;
        Ok(stream(state.database(database)?.roles.keys().cloned().collect()))
    }

    fn grants_to_database_role(&self, database: &str, role: &str) -> Result<RowStream<'_, Grant>> {
        let mut state = self.state.lock();
        state.enter(Op::GrantsTo(database.to_string(), role.to_string()))?;
        Ok(stream(state.role(database, role)?.grants.iter().cloned().collect()))
    }

    fn future_grants_to_database_role(
        &self,
        database: &str,
        role: &str,
    ) -> Result<RowStream<'_, FutureGrant>> {
        let mut state = self.state.lock();
        state.enter(Op::FutureGrantsTo(database.to_string(), role.to_string()))?;
        Ok(stream(state.role(database, role)?.future.iter().cloned().collect()))
    }

    fn grants_of_database_role(&self, database: &str, role: &str) -> Result<RowStream<'_, String>> {
        let mut state = self.state.lock();
        state.enter(Op::GrantsOf(database.to_string(), role.to_string()))?;
        Ok(stream(state.role(database, role)?.granted_to.iter().cloned().collect()))
    }

    fn execute(&self, statements: &[Statement]) -> Result<()> {
        let mut state = self.state.lock();
        state.enter(Op::Execute)?;
        for statement in statements {
            state.apply(statement)?;
            state.executed.push(statement.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::Privilege;

    fn platform() -> MemoryPlatform {
        let p = MemoryPlatform::new();
        p.add_table("DB1", "SALES", "ORDERS");
        p.add_view("DB1", "SALES", "ORDERS_V");
        p.execute(&[Statement::CreateDatabaseRole {
            database: "DB1".into(),
            role: "r".into(),
        }])
        .unwrap();
        p
    }

    #[test]
    fn test_listings() {
        let p = platform();
        let dbs: Vec<String> = p.databases().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(dbs, vec!["DB1"]);
        let objects: Vec<ObjectRow> = p.objects("DB1", "SALES").unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(objects.len(), 2);
        assert!(p.schemas("NOPE").err().unwrap().is_retryable());
        assert!(p.objects("DB1", "NOPE").err().unwrap().is_retryable());
    }

    #[test]
    fn test_grant_requires_existing_object() {
        let p = platform();
        let grant = Grant::new(
            Privilege::Select,
            ObjectType::Table,
            ObjectPath::object("DB1", "SALES", "ORDERS"),
            "r",
        );
        p.execute(&[Statement::Grant(grant.clone())]).unwrap();
        assert_eq!(p.held_grants("DB1", "r").len(), 1);
        assert_eq!(p.held_grants("DB1", "R")[0].role, "R");

        let missing = Grant::new(
            Privilege::Select,
            ObjectType::Table,
            ObjectPath::object("DB1", "SALES", "GONE"),
            "r",
        );
        let err = p.execute(&[Statement::Grant(missing)]).unwrap_err();
        assert!(err.is_retryable());

        p.execute(&[Statement::Revoke(grant)]).unwrap();
        assert!(p.held_grants("DB1", "r").is_empty());
    }

    #[test]
    fn test_future_grants_fire_on_create() {
        let p = platform();
        p.execute(&[Statement::GrantFuture(FutureGrant {
            privilege: Privilege::Select,
            on: ObjectType::Table,
            database: "DB1".into(),
            schema: Some("SALES".into()),
            role: "r".into(),
        })])
        .unwrap();

        p.add_table("DB1", "SALES", "INVOICES");
        p.add_view("DB1", "SALES", "INVOICES_V");
        p.add_table("DB1", "OTHER", "X");

        let held = p.held_grants("DB1", "r");
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].path, ObjectPath::object("DB1", "SALES", "INVOICES"));
    }

    #[test]
    fn test_injected_faults() {
        let p = platform();
        p.drift_next(Op::Schemas("DB1".into()), 2);
        assert!(p.schemas("DB1").err().unwrap().is_retryable());
        assert!(p.schemas("DB1").is_err());
        assert!(p.schemas("DB1").is_ok());
        assert_eq!(p.call_count(&Op::Schemas("DB1".into())), 3);

        p.fail_next(Op::Execute, 390_114, 1);
        let err = p.execute(&[]).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_role_to_role_grants() {
        let p = platform();
        let grant = Statement::GrantDatabaseRole {
            database: "DB1".into(),
            role: "r".into(),
            to: "consumer".into(),
        };
        assert!(p.execute(&[grant.clone()]).unwrap_err().is_retryable());

        p.add_account_role("consumer");
        p.execute(&[grant]).unwrap();
        assert_eq!(p.grantees("DB1", "r"), vec!["CONSUMER"]);
    }
}
