//! Declaration loading from files, validation failures and snapshot diffs

use grupin_rs::{Grupin, GrupinDiff, GrupinError, Reconciler};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

const V1: &str = r#"
user_groups: [analysts]
products:
  - id: sales
    dtaps: { prod: prd, non_prod: [dev, tst] }
    classification: internal
    objects:
      include: ["sales_[dtap].*.*"]
    interfaces:
      - id: reporting
        objects:
          include: ["sales_[dtap].mart.*"]
  - id: hr
    dtaps: { prod: prd }
    classification: restricted
    objects:
      include: ["hr.*.*"]
"#;

const V2: &str = r#"
user_groups: [analysts, finance]
products:
  - id: sales
    dtaps: { prod: prd, non_prod: [dev, tst] }
    classification: confidential
    objects:
      include: ["sales_[dtap].*.*"]
    interfaces:
      - id: reporting
        objects:
          include: ["sales_[dtap].mart.*"]
  - id: marketing
    dtaps: { prod: prd }
    classification: internal
    objects:
      include: ["marketing.*.*"]
    consumes:
      - product: sales
        interface: reporting
"#;

fn write_yaml(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_yaml(V1);
    let g = Grupin::from_yaml_file(file.path()).unwrap();

    assert_eq!(g.products.len(), 2);
    assert_eq!(g, Grupin::from_yaml_str(V1).unwrap());
    // sales: 3 stages x 2 interfaces, hr: 1 stage x 1 interface
    assert_eq!(Reconciler::units(&g).len(), 7);
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let err = Grupin::from_yaml_file(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, GrupinError::Io(_)));
}

#[test]
fn test_malformed_yaml() {
    let file = write_yaml("products: [ { id: sales");
    let err = Grupin::from_yaml_file(file.path()).unwrap_err();
    assert!(matches!(err, GrupinError::Yaml(_)));
}

#[test]
fn test_diff_between_files() {
    let old = Grupin::from_yaml_file(write_yaml(V1).path()).unwrap();
    let new = Grupin::from_yaml_file(write_yaml(V2).path()).unwrap();

    let diff = GrupinDiff::between(&old, &new);
    let names = |ids: &std::collections::BTreeSet<grupin_rs::Identifier>| {
        ids.iter().map(|i| i.as_str().to_string()).collect::<Vec<_>>()
    };
    assert_eq!(names(&diff.created), vec!["marketing"]);
    assert_eq!(names(&diff.deleted), vec!["hr"]);
    assert_eq!(names(&diff.updated), vec!["sales"]);
    assert_eq!(names(&diff.user_groups_created), vec!["finance"]);
    assert!(diff.user_groups_deleted.is_empty());

    assert!(GrupinDiff::between(&new, &new).is_empty());

    let json = serde_json::to_value(&diff).unwrap();
    assert_eq!(json["created"], serde_json::json!(["marketing"]));
}

#[test]
fn test_overlapping_products_rejected() {
    let yaml = r#"
products:
  - id: sales
    classification: internal
    objects: { include: ["shared.*.*"] }
  - id: finance
    classification: internal
    objects: { include: ["shared.ledger.*"] }
"#;
    let err = Grupin::from_yaml_file(write_yaml(yaml).path()).unwrap_err();
    assert!(matches!(err, GrupinError::ProductOverlap(_, _)));
}

#[test]
fn test_dangling_consumption_rejected() {
    let yaml = r#"
products:
  - id: marketing
    classification: internal
    objects: { include: ["marketing.*.*"] }
    consumes:
      - product: sales
"#;
    let err = Grupin::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, GrupinError::UnknownProduct(p) if p == "sales"));
}
