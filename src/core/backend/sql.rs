//! SQL rendering and paginated `SHOW` streams over a raw connection

use super::{render_batch, ObjectKind, ObjectRow, Platform, RowStream, Statement};
use crate::error::{GrupinError, Result};
use crate::expr::ExprPart;
use crate::grants::{FutureGrant, Grant, ObjectPath, ObjectType, Privilege};
use std::collections::BTreeMap;
use tracing::trace;

/// Maximum rows a `SHOW` command returns per call
pub const SHOW_PAGE_LIMIT: usize = 10_000;

/// One result row, keyed by lower-cased column name
pub type Row = BTreeMap<String, String>;

/// Raw SQL access to the warehouse
///
/// Implementations map platform errors through
/// [`GrupinError::from_sql`] so "does not exist or not authorized" surfaces
/// as a retryable condition.
pub trait Connection: Send + Sync {
    fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Run one or more `;`-separated statements in a single round trip.
    fn execute(&self, sql: &str) -> Result<()>;
}

/// [`Platform`] implementation rendering SQL for a [`Connection`]
pub struct SqlPlatform<C: Connection> {
    conn: C,
    page_size: usize,
}

type ParseRow<T> = fn(&Row) -> Result<Option<T>>;

impl<C: Connection> SqlPlatform<C> {
    pub fn new(conn: C) -> Self {
        Self::with_page_size(conn, SHOW_PAGE_LIMIT)
    }

    pub fn with_page_size(conn: C, page_size: usize) -> Self {
        SqlPlatform {
            conn,
            page_size: page_size.max(1),
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Paginated `SHOW` command, resumed after the last name of each page.
    fn paged<T: 'static>(&self, base: String, parse: ParseRow<T>) -> Result<RowStream<'_, T>> {
        let pages = Pages::start(&self.conn, base, self.page_size, parse)?;
        Ok(Box::new(pages))
    }

    /// `SHOW` command without pagination support, fetched in one call.
    fn unpaged<T: Send + 'static>(&self, sql: String, parse: ParseRow<T>) -> Result<RowStream<'_, T>> {
        trace!(sql = %sql, "query");
        let rows = self.conn.query(&sql)?;
        Ok(Box::new(
            rows.into_iter()
                .filter_map(move |row| parse(&row).transpose()),
        ))
    }
}

struct Pages<'a, C: Connection, T> {
    conn: &'a C,
    base: String,
    page_size: usize,
    last: Option<String>,
    buffer: std::vec::IntoIter<Row>,
    exhausted: bool,
    parse: ParseRow<T>,
}

impl<'a, C: Connection, T> Pages<'a, C, T> {
    fn start(conn: &'a C, base: String, page_size: usize, parse: ParseRow<T>) -> Result<Self> {
        let mut pages = Pages {
            conn,
            base,
            page_size,
            last: None,
            buffer: Vec::new().into_iter(),
            exhausted: false,
            parse,
        };
        pages.fetch()?;
        Ok(pages)
    }

    fn fetch(&mut self) -> Result<()> {
        let sql = match &self.last {
            Some(last) => format!("{} LIMIT {} FROM {}", self.base, self.page_size, sql_string(last)),
            None => format!("{} LIMIT {}", self.base, self.page_size),
        };
        trace!(sql = %sql, "query page");

        let rows = self.conn.query(&sql)?;
        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        match rows.last() {
            Some(row) => self.last = Some(column(row, "name")?.to_string()),
            None => self.exhausted = true,
        }
        self.buffer = rows.into_iter();
        Ok(())
    }
}

impl<C: Connection, T> Iterator for Pages<'_, C, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                match (self.parse)(&row) {
                    Ok(Some(item)) => return Some(Ok(item)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.exhausted = true;
                        self.buffer = Vec::new().into_iter();
                        return Some(Err(e));
                    }
                }
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column<'r>(row: &'r Row, name: &str) -> Result<&'r str> {
    row.get(name)
        .map(String::as_str)
        .ok_or_else(|| GrupinError::Backend(format!("result row has no '{}' column", name)))
}

fn quote(name: &str) -> String {
    ExprPart::quote_identifier(name)
}

fn parse_name(row: &Row) -> Result<Option<String>> {
    Ok(Some(column(row, "name")?.to_string()))
}

fn parse_schema(row: &Row) -> Result<Option<String>> {
    let name = column(row, "name")?;
    if name.eq_ignore_ascii_case("INFORMATION_SCHEMA") {
        return Ok(None);
    }
    Ok(Some(name.to_string()))
}

fn parse_object(row: &Row) -> Result<Option<ObjectRow>> {
    let Some(kind) = ObjectKind::parse(column(row, "kind")?) else {
        return Ok(None);
    };
    Ok(Some(ObjectRow {
        name: column(row, "name")?.to_string(),
        kind,
        owner: row.get("owner").filter(|o| !o.is_empty()).cloned(),
    }))
}

fn parse_grant(row: &Row) -> Result<Option<Grant>> {
    let (Some(privilege), Some(on)) = (
        Privilege::parse(column(row, "privilege")?),
        ObjectType::parse(column(row, "granted_on")?),
    ) else {
        return Ok(None);
    };
    let path = ObjectPath::parse(column(row, "name")?)?;
    if path.depth() != on.depth() {
        return Err(GrupinError::Backend(format!(
            "{} grant on '{}' has unexpected depth",
            on, path
        )));
    }
    Ok(Some(Grant {
        privilege,
        on,
        path,
        role: column(row, "grantee_name")?.to_string(),
        grant_option: column(row, "grant_option")?.eq_ignore_ascii_case("true"),
    }))
}

/// Future grant names look like `DB.SCHEMA.<TABLE>` or `DB.<SCHEMA>`.
fn parse_future_grant(row: &Row) -> Result<Option<FutureGrant>> {
    let (Some(privilege), Some(on)) = (
        Privilege::parse(column(row, "privilege")?),
        ObjectType::parse(column(row, "grant_on")?),
    ) else {
        return Ok(None);
    };
    let name = column(row, "name")?;
    let container = match name.rsplit_once('.') {
        Some((container, placeholder)) if placeholder.starts_with('<') => container,
        _ => {
            return Err(GrupinError::Backend(format!(
                "unexpected future grant name '{}'",
                name
            )))
        }
    };
    let path = ObjectPath::parse(container)?;
    if path.object.is_some() {
        return Err(GrupinError::Backend(format!(
            "unexpected future grant name '{}'",
            name
        )));
    }
    Ok(Some(FutureGrant {
        privilege,
        on,
        database: path.database,
        schema: path.schema,
        role: column(row, "grantee_name")?.to_string(),
    }))
}

/// Only grants to account roles; grants to other database roles are skipped.
fn parse_role_grantee(row: &Row) -> Result<Option<String>> {
    if !column(row, "granted_to")?.eq_ignore_ascii_case("ROLE") {
        return Ok(None);
    }
    Ok(Some(column(row, "grantee_name")?.to_string()))
}

impl<C: Connection> Platform for SqlPlatform<C> {
    fn databases(&self) -> Result<RowStream<'_, String>> {
        self.paged("SHOW DATABASES".to_string(), parse_name)
    }

    fn schemas(&self, database: &str) -> Result<RowStream<'_, String>> {
        self.paged(format!("SHOW SCHEMAS IN DATABASE {}", quote(database)), parse_schema)
    }

    fn objects(&self, database: &str, schema: &str) -> Result<RowStream<'_, ObjectRow>> {
        self.paged(
            format!("SHOW OBJECTS IN SCHEMA {}.{}", quote(database), quote(schema)),
            parse_object,
        )
    }

    fn database_roles(&self, database: &str) -> Result<RowStream<'_, String>> {
        self.paged(
            format!("SHOW DATABASE ROLES IN DATABASE {}", quote(database)),
            parse_name,
        )
    }

    fn grants_to_database_role(&self, database: &str, role: &str) -> Result<RowStream<'_, Grant>> {
        self.unpaged(
            format!("SHOW GRANTS TO DATABASE ROLE {}.{}", quote(database), role),
            parse_grant,
        )
    }

    fn future_grants_to_database_role(
        &self,
        database: &str,
        role: &str,
    ) -> Result<RowStream<'_, FutureGrant>> {
        self.unpaged(
            format!("SHOW FUTURE GRANTS TO DATABASE ROLE {}.{}", quote(database), role),
            parse_future_grant,
        )
    }

    fn grants_of_database_role(&self, database: &str, role: &str) -> Result<RowStream<'_, String>> {
        self.unpaged(
            format!("SHOW GRANTS OF DATABASE ROLE {}.{}", quote(database), role),
            parse_role_grantee,
        )
    }

    fn execute(&self, statements: &[Statement]) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        let sql = render_batch(statements);
        trace!(statements = statements.len(), "execute batch");
        self.conn.execute(&sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Serves `SHOW` pages from a sorted name list, honouring LIMIT/FROM.
    struct FakeConnection {
        names: Vec<String>,
        rows: Vec<Row>,
        log: Mutex<Vec<String>>,
    }

    impl FakeConnection {
        fn names(n: usize) -> Self {
            let mut names: Vec<String> = (0..n).map(|i| format!("DB_{:04}", i)).collect();
            names.sort();
            FakeConnection {
                names,
                rows: Vec::new(),
                log: Mutex::new(Vec::new()),
            }
        }

        fn rows(rows: Vec<Row>) -> Self {
            FakeConnection {
                names: Vec::new(),
                rows,
                log: Mutex::new(Vec::new()),
            }
        }
    }

    impl Connection for FakeConnection {
        fn query(&self, sql: &str) -> Result<Vec<Row>> {
            self.log.lock().push(sql.to_string());
            if sql.contains("MISSING") {
                return Err(GrupinError::from_sql(2003, "does not exist or not authorized"));
            }
            if !sql.contains(" LIMIT ") {
                return Ok(self.rows.clone());
            }

            let limit: usize = sql
                .split(" LIMIT ")
                .nth(1)
                .and_then(|rest| rest.split(' ').next())
                .and_then(|n| n.parse().ok())
                .unwrap();
            let from = sql
                .split(" FROM '")
                .nth(1)
                .map(|rest| rest.trim_end_matches('\'').to_string());

            Ok(self
                .names
                .iter()
                .filter(|n| from.as_ref().map_or(true, |f| n.as_str() > f.as_str()))
                .take(limit)
                .map(|n| Row::from([("name".to_string(), n.clone())]))
                .collect())
        }

        fn execute(&self, sql: &str) -> Result<()> {
            self.log.lock().push(sql.to_string());
            Ok(())
        }
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_pagination_is_lazy_and_complete() {
        let platform = SqlPlatform::with_page_size(FakeConnection::names(25), 10);

        let mut stream = platform.databases().unwrap();
        assert_eq!(platform.connection().log.lock().len(), 1);

        let first: Vec<String> = stream.by_ref().take(10).map(|r| r.unwrap()).collect();
        assert_eq!(first.len(), 10);
        assert_eq!(platform.connection().log.lock().len(), 1);

        let rest: Vec<String> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(rest.len(), 15);
        assert_eq!(rest[0], "DB_0010");

        let log = platform.connection().log.lock();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], "SHOW DATABASES LIMIT 10");
        assert_eq!(log[1], "SHOW DATABASES LIMIT 10 FROM 'DB_0009'");
    }

    #[test]
    fn test_exact_page_multiple_terminates() {
        let platform = SqlPlatform::with_page_size(FakeConnection::names(20), 10);
        let all: Vec<String> = platform.databases().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 20);
        // Two full pages, then an empty one
        assert_eq!(platform.connection().log.lock().len(), 3);
    }

    #[test]
    fn test_missing_database_is_drift() {
        let platform = SqlPlatform::new(FakeConnection::names(0));
        let err = platform.schemas("MISSING").err().unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_grant_rows() {
        let platform = SqlPlatform::new(FakeConnection::rows(vec![
            row(&[
                ("privilege", "SELECT"),
                ("granted_on", "TABLE"),
                ("name", "DB1.SALES.ORDERS"),
                ("grantee_name", "GRP_SALES__PRD__READ"),
                ("grant_option", "false"),
            ]),
            row(&[
                ("privilege", "OWNERSHIP"),
                ("granted_on", "TABLE"),
                ("name", "DB1.SALES.ORDERS"),
                ("grantee_name", "GRP_SALES__PRD__READ"),
                ("grant_option", "true"),
            ]),
            row(&[
                ("privilege", "USAGE"),
                ("granted_on", "DATABASE"),
                ("name", "DB1"),
                ("grantee_name", "GRP_SALES__PRD__READ"),
                ("grant_option", "false"),
            ]),
        ]));

        let grants: Vec<Grant> = platform
            .grants_to_database_role("DB1", "grp_sales__prd__read")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(grants.len(), 2);
        assert_eq!(grants[0].path, ObjectPath::object("DB1", "SALES", "ORDERS"));
        assert_eq!(grants[1].on, ObjectType::Database);
        assert_eq!(
            platform.connection().log.lock()[0],
            "SHOW GRANTS TO DATABASE ROLE \"DB1\".grp_sales__prd__read"
        );
    }

    #[test]
    fn test_future_grant_rows() {
        let platform = SqlPlatform::new(FakeConnection::rows(vec![
            row(&[
                ("privilege", "SELECT"),
                ("grant_on", "TABLE"),
                ("name", "DB1.SALES.<TABLE>"),
                ("grantee_name", "R"),
            ]),
            row(&[
                ("privilege", "USAGE"),
                ("grant_on", "SCHEMA"),
                ("name", "DB1.<SCHEMA>"),
                ("grantee_name", "R"),
            ]),
        ]));
        let grants: Vec<FutureGrant> = platform
            .future_grants_to_database_role("DB1", "r")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(grants[0].schema.as_deref(), Some("SALES"));
        assert_eq!(grants[1].on, ObjectType::Schema);
        assert_eq!(grants[1].schema, None);
    }

    #[test]
    fn test_object_rows_skip_unknown_kinds() {
        let rows = vec![
            row(&[("name", "ORDERS"), ("kind", "TABLE"), ("owner", "LOADER")]),
            row(&[("name", "ORDERS_V"), ("kind", "VIEW"), ("owner", "")]),
            row(&[("name", "STG"), ("kind", "STAGE"), ("owner", "LOADER")]),
        ];
        let parsed: Vec<ObjectRow> = rows
            .iter()
            .filter_map(|r| parse_object(r).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].owner.as_deref(), Some("LOADER"));
        assert_eq!(parsed[1].kind, ObjectKind::View);
        assert_eq!(parsed[1].owner, None);
    }

    #[test]
    fn test_execute_renders_one_round_trip() {
        let platform = SqlPlatform::new(FakeConnection::names(0));
        platform.execute(&[]).unwrap();
        assert!(platform.connection().log.lock().is_empty());

        platform
            .execute(&[
                Statement::CreateAccountRole { role: "a".into() },
                Statement::CreateAccountRole { role: "b".into() },
            ])
            .unwrap();
        let log = platform.connection().log.lock();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("a;\nCREATE ROLE"));
    }
}
