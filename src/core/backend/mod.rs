//! Platform access
//!
//! Everything the reconciler needs from the warehouse goes through the
//! [`Platform`] trait: metadata listings, live grant inspection and batched
//! statement execution. Listings are lazy row streams so paginated `SHOW`
//! commands compose without materializing whole result sets.
//!
//! - [`SqlPlatform`]: renders and pages SQL over a raw [`Connection`]
//! - [`Session`]: a platform handle plus a [`CancelToken`], threaded through
//!   every cache and reconciler call
//! - [`memory::MemoryPlatform`]: an in-process platform with fault injection

pub mod memory;
mod session;
mod sql;
mod statement;

pub use session::{CancelToken, Session};
pub use sql::{Connection, Row, SqlPlatform, SHOW_PAGE_LIMIT};
pub use statement::{render_batch, Statement};

pub(crate) use statement::target_of;

use crate::error::Result;
use crate::grants::{FutureGrant, Grant};
use serde::Serialize;

/// Single-pass, finite stream of rows
pub type RowStream<'a, T> = Box<dyn Iterator<Item = Result<T>> + Send + 'a>;

/// Kind of a schema-level object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Table,
    View,
}

impl ObjectKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TABLE" => Some(ObjectKind::Table),
            "VIEW" | "MATERIALIZED VIEW" => Some(ObjectKind::View),
            _ => None,
        }
    }
}

/// One row of an object listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    pub name: String,
    pub kind: ObjectKind,
    pub owner: Option<String>,
}

/// The warehouse as seen by the reconciler
///
/// A platform is shared by all workers; implementations must allow
/// concurrent independent calls. Listing a database or schema that does not
/// exist, or that the caller may not see, fails with
/// [`GrupinError::NotFoundOrUnauthorized`](crate::GrupinError::NotFoundOrUnauthorized).
pub trait Platform: Send + Sync {
    fn databases(&self) -> Result<RowStream<'_, String>>;

    fn schemas(&self, database: &str) -> Result<RowStream<'_, String>>;

    fn objects(&self, database: &str, schema: &str) -> Result<RowStream<'_, ObjectRow>>;

    /// Names of the database roles in one database.
    fn database_roles(&self, database: &str) -> Result<RowStream<'_, String>>;

    /// Privileges on existing objects held by a database role.
    fn grants_to_database_role(&self, database: &str, role: &str)
        -> Result<RowStream<'_, Grant>>;

    fn future_grants_to_database_role(
        &self,
        database: &str,
        role: &str,
    ) -> Result<RowStream<'_, FutureGrant>>;

    /// Account roles a database role is granted to.
    fn grants_of_database_role(&self, database: &str, role: &str)
        -> Result<RowStream<'_, String>>;

    /// Execute a batch in one round trip.
    fn execute(&self, statements: &[Statement]) -> Result<()>;
}
