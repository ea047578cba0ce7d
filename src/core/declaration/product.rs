//! Products and interfaces

use super::raw::{RawDtaps, RawInterface, RawMatcher, RawProduct};
use crate::error::{GrupinError, Result};
use crate::matcher::{ColumnMatcher, DtapSpec, Matcher, ObjMatcher, TemplateContext};
use crate::expr::Expression;
use crate::validation::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Data classification, ordered from least to most sensitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// Reference to an interface of a product (`None` = the product-level interface)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InterfaceRef {
    pub product: Identifier,
    pub interface: Option<Identifier>,
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interface {
            Some(i) => write!(f, "{}.{}", self.product, i),
            None => write!(f, "{}", self.product),
        }
    }
}

/// A named exposure of a product's objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interface {
    /// `None` for the product-level interface
    pub id: Option<Identifier>,
    pub classification: Classification,
    pub objects: ObjMatcher,
    pub masked_columns: ColumnMatcher,
    pub hashed_columns: ColumnMatcher,
    pub user_group_columns: ColumnMatcher,
}

impl Interface {
    fn build(
        id: Option<Identifier>,
        classification: Classification,
        objects: &RawMatcher,
        columns: [Option<&RawMatcher>; 3],
        ctx: &TemplateContext<'_>,
    ) -> Result<Self> {
        let objects = build_matcher(objects, ctx)?;
        let [masked, hashed, user_group] = columns;

        let interface = Interface {
            id,
            classification,
            objects,
            masked_columns: build_optional(masked, ctx)?,
            hashed_columns: build_optional(hashed, ctx)?,
            user_group_columns: build_optional(user_group, ctx)?,
        };
        interface.check_columns(ctx.dtaps)?;
        Ok(interface)
    }

    /// Column matchers must land on objects this interface exposes, stage by stage.
    fn check_columns(&self, dtaps: &DtapSpec) -> Result<()> {
        let named = [
            ("masked_columns", &self.masked_columns),
            ("hashed_columns", &self.hashed_columns),
            ("user_group_columns", &self.user_group_columns),
        ];

        for (name, columns) in named {
            if columns.is_empty() {
                continue;
            }
            for stage in &stages(dtaps) {
                let (cols, objs) = match stage {
                    Some(d) => (columns.for_dtap(d), self.objects.for_dtap(d)),
                    None => (columns.clone(), self.objects.clone()),
                };
                if cols.is_empty() {
                    continue;
                }
                if !cols.overlaps_objects(&objs) {
                    return Err(GrupinError::ColumnMatcherDisjoint {
                        interface: self.label(),
                        matcher: name.to_string(),
                        dtap: stage.unwrap_or("*").to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// A named interface only exposes what its product owns, stage by stage.
    fn check_within(
        &self,
        product: &Identifier,
        owned: &ObjMatcher,
        dtaps: &DtapSpec,
    ) -> Result<()> {
        for stage in stages(dtaps) {
            let outside = match stage {
                Some(d) => self
                    .objects
                    .for_dtap(d)
                    .outside_of(&owned.for_dtap(d))
                    .map(|e| e.to_string()),
                None => self.objects.outside_of(owned).map(|e| e.to_string()),
            };
            if let Some(expr) = outside {
                return Err(GrupinError::InterfaceOutsideProduct {
                    product: product.to_string(),
                    interface: self.label(),
                    expr,
                    dtap: stage.unwrap_or("*").to_string(),
                });
            }
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.id
            .as_ref()
            .map_or_else(|| "<product>".to_string(), |i| i.to_string())
    }
}

fn stages(dtaps: &DtapSpec) -> Vec<Option<&str>> {
    if dtaps.is_empty() {
        vec![None]
    } else {
        dtaps.all().map(|d| Some(d.as_str())).collect()
    }
}

fn build_matcher<E: Expression>(raw: &RawMatcher, ctx: &TemplateContext<'_>) -> Result<Matcher<E>> {
    Matcher::new(raw.include.as_slice(), raw.exclude.as_slice(), ctx)
}

fn build_optional<E: Expression>(
    raw: Option<&RawMatcher>,
    ctx: &TemplateContext<'_>,
) -> Result<Matcher<E>> {
    match raw {
        Some(raw) => build_matcher(raw, ctx),
        None => Ok(Matcher::default()),
    }
}

fn build_dtaps(raw: &RawDtaps) -> Result<DtapSpec> {
    let prod = raw.prod.as_deref().map(Identifier::new).transpose()?;
    let non_prod = raw
        .non_prod
        .iter()
        .map(|d| Identifier::new(d.as_str()))
        .collect::<Result<Vec<_>>>()?;

    let mut spec = DtapSpec::new(prod, non_prod)?;
    for (dtap, rendering) in &raw.render {
        spec = spec.with_rendering(dtap, rendering.clone())?;
    }
    Ok(spec)
}

/// A declared ownership boundary over part of the namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: Identifier,
    pub dtaps: DtapSpec,
    pub user_groups: BTreeSet<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producing_service: Option<Identifier>,
    /// Product-level interface; its object matcher is what the product owns
    pub interface: Interface,
    pub interfaces: BTreeMap<Identifier, Interface>,
    pub consumes: BTreeSet<InterfaceRef>,
}

/// Registries a product is validated against
pub(crate) struct Registry<'a> {
    pub user_groups: &'a BTreeSet<Identifier>,
    pub services: &'a BTreeSet<Identifier>,
}

impl Product {
    pub(crate) fn build(raw: &RawProduct, registry: &Registry<'_>) -> Result<Self> {
        let id = Identifier::new(raw.id.as_str())?;
        let dtaps = build_dtaps(&raw.dtaps)?;

        let mut user_groups = BTreeSet::new();
        for ug in &raw.user_groups {
            let ug = Identifier::new(ug.as_str())?;
            if !registry.user_groups.contains(&ug) {
                return Err(GrupinError::UnknownUserGroup(ug.into_string()));
            }
            user_groups.insert(ug);
        }

        let producing_service = match &raw.producing_service {
            Some(s) => {
                let s = Identifier::new(s.as_str())?;
                if !registry.services.contains(&s) {
                    return Err(GrupinError::UnknownService(s.into_string()));
                }
                Some(s)
            }
            None => None,
        };

        let classification = raw
            .classification
            .ok_or_else(|| GrupinError::MissingClassification(id.to_string()))?;

        let ctx = TemplateContext::new(&dtaps, &user_groups);
        let interface = Interface::build(
            None,
            classification,
            &raw.objects,
            [
                raw.masked_columns.as_ref(),
                raw.hashed_columns.as_ref(),
                raw.user_group_columns.as_ref(),
            ],
            &ctx,
        )?;

        let mut interfaces = BTreeMap::new();
        for ri in &raw.interfaces {
            let iface = Self::build_interface(ri, classification, &ctx)?;
            iface.check_within(&id, &interface.objects, &dtaps)?;
            let key = iface.id.clone().ok_or_else(|| {
                GrupinError::InvalidDeclaration(format!("interface of '{}' without id", id))
            })?;
            if interfaces.insert(key.clone(), iface).is_some() {
                return Err(GrupinError::InvalidDeclaration(format!(
                    "interface '{}' declared twice in product '{}'",
                    key, id
                )));
            }
        }

        let mut consumes = BTreeSet::new();
        for c in &raw.consumes {
            let r = InterfaceRef {
                product: Identifier::new(c.product.as_str())?,
                interface: c.interface.as_deref().map(Identifier::new).transpose()?,
            };
            if r.product == id {
                return Err(GrupinError::SelfConsumption(id.to_string()));
            }
            consumes.insert(r);
        }

        debug!(
            product = %id,
            interfaces = interfaces.len(),
            includes = interface.objects.include().len(),
            "built product"
        );

        Ok(Product {
            id,
            dtaps,
            user_groups,
            producing_service,
            interface,
            interfaces,
            consumes,
        })
    }

    fn build_interface(
        raw: &RawInterface,
        product_classification: Classification,
        ctx: &TemplateContext<'_>,
    ) -> Result<Interface> {
        Interface::build(
            Some(Identifier::new(raw.id.as_str())?),
            raw.classification.unwrap_or(product_classification),
            &raw.objects,
            [
                raw.masked_columns.as_ref(),
                raw.hashed_columns.as_ref(),
                raw.user_group_columns.as_ref(),
            ],
            ctx,
        )
    }

    /// Objects owned by this product
    pub fn objects(&self) -> &ObjMatcher {
        &self.interface.objects
    }

    /// Look up an interface; `None` selects the product-level interface.
    pub fn interface(&self, id: Option<&str>) -> Option<&Interface> {
        match id {
            None => Some(&self.interface),
            Some(id) => self.interfaces.get(id),
        }
    }

    /// Product-level interface first, then named interfaces in id order.
    pub fn all_interfaces(&self) -> impl Iterator<Item = &Interface> {
        std::iter::once(&self.interface).chain(self.interfaces.values())
    }
}
