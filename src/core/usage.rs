//! Usage summaries
//!
//! After a unit is matched, one record per include expression is written to
//! a reporting table: how many tables and views the expression matched for
//! which product, interface, stage and user group. The table is write-only;
//! nothing in the crate reads it back.

use crate::backend::{Platform, Session, Statement};
use crate::error::Result;
use crate::matcher::ObjMatcher;
use crate::matching::MatchedObjects;
use crate::validation::Identifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Matched object counts for one include expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub product: Identifier,
    /// Empty for the product-level interface
    pub interface: String,
    pub expression: String,
    pub dtap: String,
    /// Empty when the expression is shared by all user groups
    pub user_group: String,
    pub tables: u64,
    pub views: u64,
    pub recorded_at: DateTime<Utc>,
}

impl UsageRecord {
    /// One record per include expression of `matcher` found in `matched`.
    pub fn from_matched(
        product: &Identifier,
        interface: Option<&Identifier>,
        dtap: &str,
        matcher: &ObjMatcher,
        matched: &MatchedObjects,
        recorded_at: DateTime<Utc>,
    ) -> Vec<UsageRecord> {
        matcher
            .include()
            .iter()
            .filter_map(|(expr, attr)| {
                let tree = matched.tree(expr)?;
                Some(UsageRecord {
                    product: product.clone(),
                    interface: interface.map(|i| i.to_string()).unwrap_or_default(),
                    expression: expr.to_string(),
                    dtap: dtap.to_string(),
                    user_group: attr.user_group_label().to_string(),
                    tables: tree.table_count() as u64,
                    views: tree.view_count() as u64,
                    recorded_at,
                })
            })
            .collect()
    }
}

/// Insert records into `table`, `batch_size` statements per round trip.
pub fn write_usage(
    session: &Session,
    table: &str,
    records: &[UsageRecord],
    batch_size: usize,
) -> Result<usize> {
    let statements: Vec<Statement> = records
        .iter()
        .map(|record| Statement::InsertUsage {
            table: table.to_string(),
            record: record.clone(),
        })
        .collect();

    for batch in statements.chunks(batch_size.max(1)) {
        session.execute(batch)?;
    }
    debug!(table, records = records.len(), "usage written");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryPlatform, Op};
    use crate::matcher::{DtapSpec, TemplateContext};
    use crate::matching::MatchingEngine;
    use crate::cache::AccountCache;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn test_records_per_include() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.add_table("DB1", "SALES", "ORDERS");
        platform.add_view("DB1", "SALES", "ORDERS_V");
        platform.add_table("DB1", "HR", "PEOPLE");
        let session = Session::new(platform.clone());

        let dtaps = DtapSpec::default();
        let groups: BTreeSet<Identifier> = [id("analysts")].into_iter().collect();
        let ctx = TemplateContext::new(&dtaps, &groups);
        let matcher =
            ObjMatcher::new(&["db1.sales.*", "db1.hr_[user_group].*"], &[], &ctx).unwrap();

        let engine = MatchingEngine::new(Arc::new(AccountCache::new()));
        let matched = engine.evaluate(&session, &matcher, None).unwrap();
        let now = Utc::now();
        let records =
            UsageRecord::from_matched(&id("sales"), None, "prd", &matcher, &matched, now);

        assert_eq!(records.len(), 2);
        let sales = records
            .iter()
            .find(|r| r.expression == "db1.sales.*")
            .unwrap();
        assert_eq!((sales.tables, sales.views), (1, 1));
        assert_eq!(sales.user_group, "");
        assert_eq!(sales.interface, "");

        let hr = records
            .iter()
            .find(|r| r.expression == "db1.hr_analysts.*")
            .unwrap();
        assert_eq!(hr.user_group, "analysts");
        assert_eq!(hr.tables, 0);

        let written = write_usage(&session, "GRUPIN.USAGE", &records, 1).unwrap();
        assert_eq!(written, 2);
        assert_eq!(platform.call_count(&Op::Execute), 2);
        assert_eq!(platform.usage_rows().len(), 2);
        assert_eq!(platform.usage_rows()[0].0, "GRUPIN.USAGE");
    }
}
