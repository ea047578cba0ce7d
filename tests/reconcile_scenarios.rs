//! End-to-end reconciliation against the in-memory platform
//!
//! Covers drift between matching and applying, new schemas picked up by the
//! next run, and many units on the worker pool at once.

use grupin_rs::backend::memory::MemoryPlatform;
use grupin_rs::grants::Privilege;
use grupin_rs::{
    AccountCache, Config, Grupin, GrupinError, Identifier, ReconcileUnit, Reconciler, RoleNaming,
    Session,
};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

const SALES: &str = r#"
products:
  - id: sales
    dtaps: { prod: prd }
    classification: internal
    objects:
      include: ["db1.*.*"]
      exclude: ["db1.staging.*"]
"#;

const ROLE: &str = "grp_sales__prd__read";

fn config() -> Config {
    let mut config = Config::new(RoleNaming::new("grp_", "if_").unwrap());
    config.retry_base_delay = Duration::ZERO;
    config
}

fn platform() -> Arc<MemoryPlatform> {
    let p = Arc::new(MemoryPlatform::new());
    p.add_table("DB1", "SALES", "ORDERS");
    p.add_table("DB1", "SALES", "CUSTOMERS");
    p.add_view("DB1", "SALES", "ORDERS_V");
    p.add_table("DB1", "STAGING", "TMP");
    p
}

fn sales_unit() -> ReconcileUnit {
    ReconcileUnit {
        product: Identifier::new("sales").unwrap(),
        dtap: Identifier::new("prd").unwrap(),
        interface: None,
    }
}

fn selected(p: &MemoryPlatform, role: &str) -> Vec<String> {
    let mut objects: Vec<String> = p
        .held_grants("DB1", role)
        .into_iter()
        .filter(|g| g.privilege == Privilege::Select)
        .filter_map(|g| g.path.object)
        .collect();
    objects.sort();
    objects
}

#[test]
fn test_object_dropped_after_matching() {
    let p = platform();
    let g = Grupin::from_yaml_str(SALES).unwrap();
    let cache = Arc::new(AccountCache::new());
    let session = Session::new(p.clone());

    // Warm the shared cache, then drop a table behind its back
    let reconciler = Reconciler::with_cache(config(), session, cache);
    let matcher = g.product("sales").unwrap().objects().for_dtap("prd");
    let warm = reconciler
        .engine()
        .evaluate(reconciler.session(), &matcher, None)
        .unwrap();
    assert_eq!(warm.table_count(), 2);
    p.drop_object("DB1", "SALES", "ORDERS");

    let outcome = reconciler.reconcile_unit(&g, &sales_unit());
    assert!(outcome.is_success(), "{:?}", outcome.result);
    assert_eq!(outcome.attempts, 2);

    assert_eq!(selected(&p, ROLE), vec!["CUSTOMERS", "ORDERS_V"]);
}

#[test]
fn test_new_schema_picked_up_next_run() {
    let p = platform();
    let g = Grupin::from_yaml_str(SALES).unwrap();
    let reconciler = Reconciler::new(config(), Session::new(p.clone()));
    assert!(reconciler.reconcile_all(&g).unwrap().is_success());
    assert_eq!(selected(&p, ROLE).len(), 3);

    // STAGING is carved out, so future grants are per schema and a new
    // schema waits for the next run
    p.add_table("DB1", "FINANCE", "LEDGER");
    let report = reconciler.reconcile_all(&g).unwrap();
    assert!(report.is_success());
    assert!(report.granted() > 0);
    assert_eq!(selected(&p, ROLE).len(), 4);

    // Nothing left to do
    assert_eq!(reconciler.reconcile_all(&g).unwrap().granted(), 0);
}

#[test]
fn test_interface_grants_stay_inside_product() {
    let p = platform();
    p.add_table("DB2", "PUBLIC", "CAMPAIGNS");
    let reconciler = Reconciler::new(config(), Session::new(p.clone()));

    let yaml = |interface_include: &str| {
        format!(
            r#"
products:
  - id: sales
    dtaps: {{ prod: prd }}
    classification: internal
    objects: {{ include: ["db1.*.*"] }}
    interfaces:
      - id: out
        objects: {{ include: ["{}"] }}
  - id: marketing
    dtaps: {{ prod: prd }}
    classification: internal
    objects: {{ include: ["db2.*.*"] }}
"#,
            interface_include
        )
    };

    let err = Grupin::from_yaml_str(&yaml("db2.*.*")).unwrap_err();
    assert!(matches!(err, GrupinError::InterfaceOutsideProduct { .. }));

    let g = Grupin::from_yaml_str(&yaml("db1.sales.*")).unwrap();
    assert!(reconciler.reconcile_all(&g).unwrap().is_success());

    let role = "grp_sales__prd__if_out__read";
    assert_eq!(selected(&p, role), vec!["CUSTOMERS", "ORDERS", "ORDERS_V"]);
    assert!(p.held_grants("DB2", role).is_empty());
}

#[test]
fn test_unit_string_identity() {
    assert_eq!(sales_unit().to_string(), "sales/prd");
}

#[test]
fn test_many_units_on_worker_pool() {
    const PRODUCTS: usize = 24;

    let p = Arc::new(MemoryPlatform::new());
    let mut yaml = String::from("products:\n");
    for i in 0..PRODUCTS {
        p.add_table(&format!("DB{}", i), "PUBLIC", "A");
        p.add_view(&format!("DB{}", i), "PUBLIC", "B");
        writeln!(
            yaml,
            "  - id: p{i}\n    dtaps: {{ prod: prd }}\n    classification: internal\n    objects: {{ include: [\"db{i}.*.*\"] }}"
        )
        .unwrap();
        if i > 0 {
            writeln!(yaml, "    consumes: [{{ product: p{} }}]", i - 1).unwrap();
        }
    }
    let g = Grupin::from_yaml_str(&yaml).unwrap();

    let mut config = config();
    config.workers = 8;
    config.batch_size = 3;
    let reconciler = Reconciler::new(config, Session::new(p.clone()));
    let report = reconciler.reconcile_all(&g).unwrap();

    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), PRODUCTS);
    let units: Vec<String> = report.outcomes.iter().map(|o| o.unit.to_string()).collect();
    let mut sorted = units.clone();
    sorted.sort();
    assert_eq!(units, sorted);

    for i in 0..PRODUCTS {
        let db = format!("DB{}", i);
        let role = format!("grp_p{}__prd__read", i);
        // USAGE on database and schema, SELECT on the table and the view
        assert_eq!(p.held_grants(&db, &role).len(), 4, "{}", role);
        let expected = if i + 1 < PRODUCTS { 2 } else { 1 };
        assert_eq!(p.grantees(&db, &role).len(), expected, "{}", role);
    }
}
