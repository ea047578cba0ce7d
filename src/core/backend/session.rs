//! Platform handle threaded through every component call

use super::{ObjectRow, Platform, RowStream, Statement};
use crate::error::{GrupinError, Result};
use crate::grants::{FutureGrant, Grant};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared by a session and its clones
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(GrupinError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A platform plus the cancellation signal for one run
///
/// Every backend call checks the token first, and row streams check it
/// between rows, so a cancelled listing stops at the next row boundary.
#[derive(Clone)]
pub struct Session {
    platform: Arc<dyn Platform>,
    cancel: CancelToken,
}

impl Session {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self::with_cancel(platform, CancelToken::new())
    }

    pub fn with_cancel(platform: Arc<dyn Platform>, cancel: CancelToken) -> Self {
        Session { platform, cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    fn guard<'a, T: 'a>(&'a self, mut stream: RowStream<'a, T>) -> RowStream<'a, T> {
        let cancel = &self.cancel;
        let mut done = false;
        Box::new(std::iter::from_fn(move || {
            if done {
                return None;
            }
            if let Err(e) = cancel.check() {
                done = true;
                return Some(Err(e));
            }
            stream.next()
        }))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Platform for Session {
    fn databases(&self) -> Result<RowStream<'_, String>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.databases()?))
    }

    fn schemas(&self, database: &str) -> Result<RowStream<'_, String>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.schemas(database)?))
    }

    fn objects(&self, database: &str, schema: &str) -> Result<RowStream<'_, ObjectRow>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.objects(database, schema)?))
    }

    fn database_roles(&self, database: &str) -> Result<RowStream<'_, String>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.database_roles(database)?))
    }

    fn grants_to_database_role(&self, database: &str, role: &str) -> Result<RowStream<'_, Grant>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.grants_to_database_role(database, role)?))
    }

    fn future_grants_to_database_role(
        &self,
        database: &str,
        role: &str,
    ) -> Result<RowStream<'_, FutureGrant>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.future_grants_to_database_role(database, role)?))
    }

    fn grants_of_database_role(&self, database: &str, role: &str) -> Result<RowStream<'_, String>> {
        self.cancel.check()?;
        Ok(self.guard(self.platform.grants_of_database_role(database, role)?))
    }

    fn execute(&self, statements: &[Statement]) -> Result<()> {
        self.cancel.check()?;
        self.platform.execute(statements)
    }
}
