//! Raw declaration records as read from the YAML document
//!
//! These mirror the document shape one-to-one and carry no validation;
//! [`crate::Grupin::build`] turns them into the checked model.

use super::Classification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGrupin {
    #[serde(default)]
    pub user_groups: Vec<String>,
    #[serde(default)]
    pub producing_services: Vec<RawService>,
    #[serde(default)]
    pub products: Vec<RawProduct>,
}

impl RawGrupin {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawService {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDtaps {
    #[serde(default)]
    pub prod: Option<String>,
    #[serde(default)]
    pub non_prod: Vec<String>,
    /// Per-stage override of the `[dtap]` rendering
    #[serde(default)]
    pub render: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMatcher {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProduct {
    pub id: String,
    #[serde(default)]
    pub dtaps: RawDtaps,
    #[serde(default)]
    pub user_groups: Vec<String>,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub producing_service: Option<String>,
    pub objects: RawMatcher,
    #[serde(default)]
    pub masked_columns: Option<RawMatcher>,
    #[serde(default)]
    pub hashed_columns: Option<RawMatcher>,
    #[serde(default)]
    pub user_group_columns: Option<RawMatcher>,
    #[serde(default)]
    pub interfaces: Vec<RawInterface>,
    #[serde(default)]
    pub consumes: Vec<RawConsume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInterface {
    pub id: String,
    #[serde(default)]
    pub classification: Option<Classification>,
    pub objects: RawMatcher,
    #[serde(default)]
    pub masked_columns: Option<RawMatcher>,
    #[serde(default)]
    pub hashed_columns: Option<RawMatcher>,
    #[serde(default)]
    pub user_group_columns: Option<RawMatcher>,
}

/// Reference to a consumed interface; no interface means the product-level one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConsume {
    pub product: String,
    #[serde(default)]
    pub interface: Option<String>,
}
