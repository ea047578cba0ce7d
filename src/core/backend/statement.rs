//! Typed DDL/DML statements and their SQL rendering

use crate::expr::ExprPart;
use crate::grants::{FutureGrant, Grant, ObjectPath};
use crate::usage::UsageRecord;
use std::fmt;

/// A statement the reconciler sends to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateDatabaseRole { database: String, role: String },
    CreateAccountRole { role: String },
    Grant(Grant),
    Revoke(Grant),
    GrantFuture(FutureGrant),
    RevokeFuture(FutureGrant),
    /// Grant a database role to an account role
    GrantDatabaseRole {
        database: String,
        role: String,
        to: String,
    },
    RevokeDatabaseRole {
        database: String,
        role: String,
        from: String,
    },
    InsertUsage { table: String, record: UsageRecord },
}

impl Statement {
    /// Whether this statement adds access (as opposed to removing it).
    pub fn is_grant(&self) -> bool {
        matches!(
            self,
            Statement::Grant(_) | Statement::GrantFuture(_) | Statement::GrantDatabaseRole { .. }
        )
    }

    pub fn is_revoke(&self) -> bool {
        matches!(
            self,
            Statement::Revoke(_) | Statement::RevokeFuture(_) | Statement::RevokeDatabaseRole { .. }
        )
    }
}

fn database_role(database: &str, role: &str) -> String {
    format!("{}.{}", ExprPart::quote_identifier(database), role)
}

fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::CreateDatabaseRole { database, role } => {
                write!(f, "CREATE DATABASE ROLE IF NOT EXISTS {}", database_role(database, role))
            }
            Statement::CreateAccountRole { role } => {
                write!(f, "CREATE ROLE IF NOT EXISTS {}", role)
            }
            Statement::Grant(g) => write!(
                f,
                "GRANT {} ON {} {} TO DATABASE ROLE {}",
                g.privilege,
                g.on,
                g.path,
                database_role(&g.path.database, &g.role)
            ),
            Statement::Revoke(g) => write!(
                f,
                "REVOKE {} ON {} {} FROM DATABASE ROLE {}",
                g.privilege,
                g.on,
                g.path,
                database_role(&g.path.database, &g.role)
            ),
            Statement::GrantFuture(g) => write!(
                f,
                "GRANT {} ON FUTURE {} IN {} TO DATABASE ROLE {}",
                g.privilege,
                g.on.plural_sql(),
                g.container(),
                database_role(&g.database, &g.role)
            ),
            Statement::RevokeFuture(g) => write!(
                f,
                "REVOKE {} ON FUTURE {} IN {} FROM DATABASE ROLE {}",
                g.privilege,
                g.on.plural_sql(),
                g.container(),
                database_role(&g.database, &g.role)
            ),
            Statement::GrantDatabaseRole { database, role, to } => write!(
                f,
                "GRANT DATABASE ROLE {} TO ROLE {}",
                database_role(database, role),
                to
            ),
            Statement::RevokeDatabaseRole {
                database,
                role,
                from,
            } => write!(
                f,
                "REVOKE DATABASE ROLE {} FROM ROLE {}",
                database_role(database, role),
                from
            ),
            Statement::InsertUsage { table, record } => write!(
                f,
                "INSERT INTO {} (product, interface, expression, dtap, user_group, tables, views, recorded_at) \
                 VALUES ({}, {}, {}, {}, {}, {}, {}, {})",
                table,
                sql_string(record.product.as_str()),
                sql_string(&record.interface),
                sql_string(&record.expression),
                sql_string(&record.dtap),
                sql_string(&record.user_group),
                record.tables,
                record.views,
                sql_string(&record.recorded_at.to_rfc3339()),
            ),
        }
    }
}

/// Render a batch as one multi-statement round trip.
pub fn render_batch(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(|s| format!("{};", s))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Path a statement touches, for drift diagnostics.
pub(crate) fn target_of(statement: &Statement) -> Option<ObjectPath> {
    match statement {
        Statement::Grant(g) | Statement::Revoke(g) => Some(g.path.clone()),
        Statement::GrantFuture(g) | Statement::RevokeFuture(g) => Some(match &g.schema {
            Some(s) => ObjectPath::schema(g.database.clone(), s.clone()),
            None => ObjectPath::database(g.database.clone()),
        }),
        Statement::CreateDatabaseRole { database, .. }
        | Statement::GrantDatabaseRole { database, .. }
        | Statement::RevokeDatabaseRole { database, .. } => {
            Some(ObjectPath::database(database.clone()))
        }
        Statement::CreateAccountRole { .. } | Statement::InsertUsage { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::{ObjectType, Privilege};

    fn grant() -> Grant {
        Grant::new(
            Privilege::Select,
            ObjectType::Table,
            ObjectPath::object("DB1", "SALES", "ORDERS"),
            "grp_sales__prd__read",
        )
    }

    #[test]
    fn test_grant_sql() {
        assert_eq!(
            Statement::Grant(grant()).to_string(),
            r#"GRANT SELECT ON TABLE "DB1"."SALES"."ORDERS" TO DATABASE ROLE "DB1".grp_sales__prd__read"#
        );
        assert_eq!(
            Statement::Revoke(grant()).to_string(),
            r#"REVOKE SELECT ON TABLE "DB1"."SALES"."ORDERS" FROM DATABASE ROLE "DB1".grp_sales__prd__read"#
        );
    }

    #[test]
    fn test_future_grant_sql() {
        let fg = FutureGrant {
            privilege: Privilege::Usage,
            on: ObjectType::Schema,
            database: "DB1".into(),
            schema: None,
            role: "r".into(),
        };
        assert_eq!(
            Statement::GrantFuture(fg).to_string(),
            r#"GRANT USAGE ON FUTURE SCHEMAS IN DATABASE "DB1" TO DATABASE ROLE "DB1".r"#
        );
    }

    #[test]
    fn test_role_statements() {
        let s = Statement::GrantDatabaseRole {
            database: "DB1".into(),
            role: "grp_sales__prd__read".into(),
            to: "grp_marketing__prd__read".into(),
        };
        assert_eq!(
            s.to_string(),
            r#"GRANT DATABASE ROLE "DB1".grp_sales__prd__read TO ROLE grp_marketing__prd__read"#
        );
        assert!(s.is_grant());
        assert!(!s.is_revoke());

        let batch = render_batch(&[
            Statement::CreateAccountRole { role: "a".into() },
            Statement::CreateDatabaseRole {
                database: "DB1".into(),
                role: "b".into(),
            },
        ]);
        assert_eq!(
            batch,
            "CREATE ROLE IF NOT EXISTS a;\nCREATE DATABASE ROLE IF NOT EXISTS \"DB1\".b;"
        );
    }
}
