//! Snapshot comparison of two declarations

use super::Grupin;
use crate::validation::Identifier;
use serde::Serialize;
use std::collections::BTreeSet;

/// Structural difference between two declarations
///
/// Products are compared by id; a product present in both snapshots is
/// `updated` when its validated model differs in any way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrupinDiff {
    pub created: BTreeSet<Identifier>,
    pub deleted: BTreeSet<Identifier>,
    pub updated: BTreeSet<Identifier>,
    pub user_groups_created: BTreeSet<Identifier>,
    pub user_groups_deleted: BTreeSet<Identifier>,
}

impl GrupinDiff {
    pub fn between(old: &Grupin, new: &Grupin) -> Self {
        let mut diff = GrupinDiff::default();

        for (id, product) in &new.products {
            match old.products.get(id) {
                None => {
                    diff.created.insert(id.clone());
                }
                Some(prev) if prev != product => {
                    diff.updated.insert(id.clone());
                }
                Some(_) => {}
            }
        }
        diff.deleted = old
            .products
            .keys()
            .filter(|id| !new.products.contains_key(*id))
            .cloned()
            .collect();

        diff.user_groups_created = new.user_groups.difference(&old.user_groups).cloned().collect();
        diff.user_groups_deleted = old.user_groups.difference(&new.user_groups).cloned().collect();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.deleted.is_empty()
            && self.updated.is_empty()
            && self.user_groups_created.is_empty()
            && self.user_groups_deleted.is_empty()
    }
}
