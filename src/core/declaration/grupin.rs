//! The complete declaration

use super::product::{Product, Registry};
use super::raw::RawGrupin;
use crate::error::{GrupinError, Result};
use crate::validation::Identifier;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// All products, producing services and user groups
///
/// Invariants (checked by [`Grupin::build`]):
/// - product ids are unique
/// - every consumption edge resolves to an existing product and interface
/// - no two products' object matchers overlap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Grupin {
    pub user_groups: BTreeSet<Identifier>,
    pub producing_services: BTreeSet<Identifier>,
    pub products: BTreeMap<Identifier, Product>,
}

impl Grupin {
    /// Validate raw records into a declaration.
    pub fn build(raw: &RawGrupin) -> Result<Self> {
        let user_groups = unique_ids(raw.user_groups.iter().map(String::as_str), "user group")?;
        let producing_services = unique_ids(
            raw.producing_services.iter().map(|s| s.id.as_str()),
            "producing service",
        )?;

        let registry = Registry {
            user_groups: &user_groups,
            services: &producing_services,
        };

        let mut products = BTreeMap::new();
        for rp in &raw.products {
            let product = Product::build(rp, &registry)?;
            if products.contains_key(&product.id) {
                return Err(GrupinError::InvalidDeclaration(format!(
                    "product '{}' declared twice",
                    product.id
                )));
            }
            products.insert(product.id.clone(), product);
        }

        let grupin = Grupin {
            user_groups,
            producing_services,
            products,
        };
        grupin.check_consumption()?;
        grupin.check_ownership()?;

        info!(
            products = grupin.products.len(),
            user_groups = grupin.user_groups.len(),
            "declaration validated"
        );
        Ok(grupin)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw = RawGrupin::from_yaml_str(yaml)?;
        Self::build(&raw)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading declaration");
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    /// Products consuming one interface of `product` (`None` = product level).
    pub fn consumers_of<'a>(
        &'a self,
        product: &'a str,
        interface: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Product> + 'a {
        self.products.values().filter(move |p| {
            p.consumes.iter().any(|r| {
                r.product.as_str() == product
                    && r.interface.as_ref().map(Identifier::as_str) == interface
            })
        })
    }

    fn check_consumption(&self) -> Result<()> {
        for product in self.products.values() {
            for r in &product.consumes {
                let target = self
                    .products
                    .get(&r.product)
                    .ok_or_else(|| GrupinError::UnknownProduct(r.product.to_string()))?;
                if let Some(iface) = &r.interface {
                    if !target.interfaces.contains_key(iface) {
                        return Err(GrupinError::UnknownInterface {
                            product: r.product.to_string(),
                            interface: iface.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Ownership is partitioned: no two products may match the same object.
    fn check_ownership(&self) -> Result<()> {
        let products: Vec<&Product> = self.products.values().collect();
        for (i, a) in products.iter().enumerate() {
            for b in &products[i + 1..] {
                if let Some((ea, eb)) = a.objects().overlap_with(b.objects()) {
                    debug!(a = %ea, b = %eb, "product objects overlap");
                    return Err(GrupinError::ProductOverlap(a.id.to_string(), b.id.to_string()));
                }
            }
        }
        Ok(())
    }
}

fn unique_ids<'a>(
    ids: impl IntoIterator<Item = &'a str>,
    what: &str,
) -> Result<BTreeSet<Identifier>> {
    let mut out = BTreeSet::new();
    for id in ids {
        let id = Identifier::new(id)?;
        if out.contains(&id) {
            return Err(GrupinError::InvalidDeclaration(format!(
                "{} '{}' registered twice",
                what, id
            )));
        }
        out.insert(id);
    }
    Ok(out)
}
