//! Matcher construction tests

use super::*;
use crate::error::GrupinError;
use crate::expr::{Expression, ObjExpr};
use crate::validation::Identifier;
use std::collections::BTreeSet;

fn id(s: &str) -> Identifier {
    Identifier::new(s).unwrap()
}

fn obj(s: &str) -> ObjExpr {
    s.parse().unwrap()
}

struct Ctx {
    dtaps: DtapSpec,
    user_groups: BTreeSet<Identifier>,
}

impl Ctx {
    fn new(dtaps: &[&str], user_groups: &[&str]) -> Self {
        Ctx {
            dtaps: DtapSpec::new(None, dtaps.iter().map(|d| id(d))).unwrap(),
            user_groups: user_groups.iter().map(|u| id(u)).collect(),
        }
    }

    fn get(&self) -> TemplateContext<'_> {
        TemplateContext::new(&self.dtaps, &self.user_groups)
    }

    fn matcher(&self, include: &[&str], exclude: &[&str]) -> crate::Result<ObjMatcher> {
        ObjMatcher::new(include, exclude, &self.get())
    }
}

#[test]
fn test_simple_matcher() {
    let ctx = Ctx::new(&[], &[]);
    let m = ctx.matcher(&["db1.*.*", "db2.sales.*"], &["db1.tmp.*"]).unwrap();

    assert_eq!(m.include().len(), 2);
    assert_eq!(m.exclude().len(), 1);
    assert_eq!(m.superset_of(&obj("db1.tmp.*")), Some(&obj("db1.*.*")));
    assert_eq!(
        m.excludes_of(&obj("db1.*.*")).collect::<Vec<_>>(),
        vec![&obj("db1.tmp.*")]
    );
    assert_eq!(m.excludes_of(&obj("db2.sales.*")).count(), 0);
}

#[test]
fn test_overlapping_includes_rejected() {
    let ctx = Ctx::new(&[], &[]);
    let err = ctx.matcher(&["db1.*.*", "db1.sales.*"], &[]).unwrap_err();
    assert!(matches!(err, GrupinError::Overlap(_, _)));
}

#[test]
fn test_overlapping_excludes_rejected() {
    let ctx = Ctx::new(&[], &[]);
    let err = ctx
        .matcher(&["db1.*.*"], &["db1.tmp*.*", "db1.tmp_x.*"])
        .unwrap_err();
    assert!(matches!(err, GrupinError::Overlap(_, _)));
}

#[test]
fn test_orphan_exclude_rejected() {
    let ctx = Ctx::new(&[], &[]);
    let err = ctx.matcher(&["db1.*.*"], &["db2.tmp.*"]).unwrap_err();
    assert!(matches!(err, GrupinError::OrphanExclude(_)));

    // An exclude equal to its include is not a strict subset
    let err = ctx.matcher(&["db1.*.*"], &["db1.*.*"]).unwrap_err();
    assert!(matches!(err, GrupinError::OrphanExclude(_)));
}

#[test]
fn test_ambiguous_exclude_rejected() {
    let ctx = Ctx::new(&[], &[]);
    let err = ctx
        .matcher(&["db1.*.*", "db1.sales*.*"], &["db1.sales_eu.orders"])
        .unwrap_err();
    assert!(matches!(err, GrupinError::AmbiguousExclude { .. }));
}

#[test]
fn test_duplicate_expression_rejected() {
    let ctx = Ctx::new(&[], &[]);
    let err = ctx.matcher(&["db1.*.*", "DB1.*.*"], &[]).unwrap_err();
    assert!(matches!(err, GrupinError::DuplicateExpression(_)));
}

#[test]
fn test_dtap_template_yields_one_expression_per_stage() {
    let ctx = Ctx::new(&["dev", "prod"], &["analysts", "finance"]);
    let m = ctx.matcher(&["db_[dtap].sales.*"], &[]).unwrap();

    assert_eq!(m.include().len(), 2);
    let dev = &m.include()[&obj("db_dev.sales.*")];
    assert_eq!(dev.dtap, Some(id("dev")));
    assert_eq!(dev.user_group, None);
    let prod = &m.include()[&obj("db_prod.sales.*")];
    assert_eq!(prod.dtap, Some(id("prod")));
    assert_eq!(prod.user_group, None);
}

#[test]
fn test_for_dtap_filters_includes_and_their_excludes() {
    let ctx = Ctx::new(&["dev", "prod"], &[]);
    let m = ctx
        .matcher(&["db_[dtap].*.*", "shared.s.*"], &["db_[dtap].tmp.*"])
        .unwrap();

    let dev = m.for_dtap("dev");
    assert_eq!(
        dev.include().keys().cloned().collect::<Vec<_>>(),
        vec![obj("db_dev.*.*"), obj("shared.s.*")]
    );
    assert_eq!(
        dev.exclude().keys().cloned().collect::<Vec<_>>(),
        vec![obj("db_dev.tmp.*")]
    );
    assert_eq!(
        dev.superset_of(&obj("db_dev.tmp.*")),
        Some(&obj("db_dev.*.*"))
    );
}

#[test]
fn test_overlap_between_matchers() {
    let ctx = Ctx::new(&[], &[]);
    let a = ctx.matcher(&["db1.*.*"], &[]).unwrap();
    let b = ctx.matcher(&["db1.sales.*"], &[]).unwrap();
    let c = ctx.matcher(&["db2.*.*"], &[]).unwrap();

    assert!(a.overlaps(&b));
    assert!(b.overlaps(&a));
    assert!(!a.overlaps(&c));
}

#[test]
fn test_overlap_carved_out_by_exclude() {
    let ctx = Ctx::new(&[], &[]);
    let a = ctx.matcher(&["db1.*.*"], &["db1.sales.*"]).unwrap();
    let b = ctx.matcher(&["db1.sales.orders"], &[]).unwrap();
    assert!(!a.overlaps(&b));

    let b = ctx.matcher(&["db1.sales*.*"], &[]).unwrap();
    assert!(a.overlaps(&b));
}

#[test]
fn test_outside_of() {
    let ctx = Ctx::new(&[], &[]);
    let owner = ctx.matcher(&["db1.*.*"], &["db1.staging.*"]).unwrap();

    let nested = ctx.matcher(&["db1.mart.*", "db1.crm.users"], &[]).unwrap();
    assert_eq!(nested.outside_of(&owner), None);

    let foreign = ctx.matcher(&["db1.mart.*", "db2.*.*"], &[]).unwrap();
    assert_eq!(foreign.outside_of(&owner), Some(&obj("db2.*.*")));

    // Same include as the owner, but without its carve-out
    let wide = ctx.matcher(&["db1.*.*"], &[]).unwrap();
    assert_eq!(wide.outside_of(&owner), Some(&obj("db1.*.*")));

    let carved = ctx.matcher(&["db1.*.*"], &["db1.staging.*"]).unwrap();
    assert_eq!(carved.outside_of(&owner), None);

    let staging = ctx.matcher(&["db1.staging.orders"], &[]).unwrap();
    assert_eq!(staging.outside_of(&owner), Some(&obj("db1.staging.orders")));

    assert_eq!(ObjMatcher::default().outside_of(&owner), None);
}

#[test]
fn test_covers() {
    let ctx = Ctx::new(&[], &[]);
    let m = ctx.matcher(&["db1.sales*.*"], &["db1.sales_tmp.*"]).unwrap();
    assert!(m.covers(&["DB1", "SALES_EU", "ORDERS"]));
    assert!(!m.covers(&["DB1", "SALES_TMP", "ORDERS"]));
    assert!(!m.covers(&["DB2", "SALES_EU", "ORDERS"]));
}

#[test]
fn test_column_matcher_overlaps_objects() {
    let ctx = Ctx::new(&[], &[]);
    let objects = ctx.matcher(&["db1.sales.*"], &["db1.sales.tmp*"]).unwrap();

    let cols = ColumnMatcher::new(&["db1.sales.orders.email"], &[], &ctx.get()).unwrap();
    assert!(cols.overlaps_objects(&objects));

    let cols = ColumnMatcher::new(&["db1.sales.tmp_x.email"], &[], &ctx.get()).unwrap();
    assert!(!cols.overlaps_objects(&objects));

    let cols = ColumnMatcher::new(&["db2.*.*.email"], &[], &ctx.get()).unwrap();
    assert!(!cols.overlaps_objects(&objects));
}

#[test]
fn test_matcher_serializes_expressions_as_strings() {
    let ctx = Ctx::new(&["dev"], &[]);
    let m = ctx.matcher(&["db_[dtap].*.*"], &[]).unwrap();
    let json = serde_json::to_value(&m).unwrap();
    assert_eq!(json["include"]["db_dev.*.*"]["dtap"], "dev");
    assert!(json.get("exclude").is_none());
    assert!(obj("db_dev.*.*").subset_of(&obj("db_*.*.*")));
}
