//! Deployment stages and expression attribution

use crate::error::{GrupinError, Result};
use crate::validation::Identifier;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Deployment stages (DTAP) a product is rolled out to
///
/// One optional production stage plus any number of non-production stages.
/// Each stage may override the string substituted for `[dtap]` in templates;
/// by default a stage renders as its own name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DtapSpec {
    prod: Option<Identifier>,
    non_prod: BTreeSet<Identifier>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    render: BTreeMap<Identifier, String>,
}

impl DtapSpec {
    pub fn new(
        prod: Option<Identifier>,
        non_prod: impl IntoIterator<Item = Identifier>,
    ) -> Result<Self> {
        let non_prod: BTreeSet<Identifier> = non_prod.into_iter().collect();
        if let Some(p) = &prod {
            if non_prod.contains(p) {
                return Err(GrupinError::InvalidDeclaration(format!(
                    "stage '{}' is both production and non-production",
                    p
                )));
            }
        }
        Ok(DtapSpec {
            prod,
            non_prod,
            render: BTreeMap::new(),
        })
    }

    /// Override the `[dtap]` rendering of a registered stage.
    pub fn with_rendering(mut self, dtap: &str, rendering: impl Into<String>) -> Result<Self> {
        let id = self
            .all()
            .find(|d| d.as_str() == dtap)
            .cloned()
            .ok_or_else(|| {
                GrupinError::InvalidDeclaration(format!(
                    "rendering given for unregistered stage '{}'",
                    dtap
                ))
            })?;
        self.render.insert(id, rendering.into());
        Ok(self)
    }

    /// All stages, production first.
    pub fn all(&self) -> impl Iterator<Item = &Identifier> {
        self.prod.iter().chain(self.non_prod.iter())
    }

    pub fn prod(&self) -> Option<&Identifier> {
        self.prod.as_ref()
    }

    pub fn contains(&self, dtap: &str) -> bool {
        self.all().any(|d| d.as_str() == dtap)
    }

    pub fn is_prod(&self, dtap: &str) -> bool {
        self.prod.as_ref().is_some_and(|p| p.as_str() == dtap)
    }

    pub fn len(&self) -> usize {
        self.prod.iter().count() + self.non_prod.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// String substituted for `[dtap]` when rendering for `dtap`.
    pub fn rendering<'a>(&'a self, dtap: &'a Identifier) -> &'a str {
        self.render
            .get(dtap)
            .map(String::as_str)
            .unwrap_or(dtap.as_str())
    }
}

/// Stage and user group an expression was rendered for
///
/// `None` means the expression applies to every stage (or every user group).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExprAttr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtap: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_group: Option<Identifier>,
}

impl ExprAttr {
    pub fn all() -> Self {
        ExprAttr::default()
    }

    pub fn for_dtap(dtap: Identifier) -> Self {
        ExprAttr {
            dtap: Some(dtap),
            user_group: None,
        }
    }

    pub fn applies_to_dtap(&self, dtap: &str) -> bool {
        self.dtap.as_ref().map_or(true, |d| d.as_str() == dtap)
    }

    /// Label used in usage records: the stage or user group, or empty for all.
    pub fn dtap_label(&self) -> &str {
        self.dtap.as_ref().map_or("", Identifier::as_str)
    }

    pub fn user_group_label(&self) -> &str {
        self.user_group.as_ref().map_or("", Identifier::as_str)
    }
}
