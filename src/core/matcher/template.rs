//! Placeholder expansion for raw expressions
//!
//! `[dtap]` and `[user_group]` may appear anywhere in a raw expression,
//! including inside quoted components, and are expanded before parsing.

use super::{DtapSpec, ExprAttr};
use crate::error::{GrupinError, Result};
use crate::validation::Identifier;
use std::collections::{BTreeMap, BTreeSet};

pub const DTAP_PLACEHOLDER: &str = "[dtap]";
pub const USER_GROUP_PLACEHOLDER: &str = "[user_group]";

/// What a raw expression may be rendered against
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub dtaps: &'a DtapSpec,
    pub user_groups: &'a BTreeSet<Identifier>,
}

impl<'a> TemplateContext<'a> {
    pub fn new(dtaps: &'a DtapSpec, user_groups: &'a BTreeSet<Identifier>) -> Self {
        TemplateContext { dtaps, user_groups }
    }
}

/// Expand placeholders, returning each distinct rendering with its attribution.
///
/// Renderings that collapse onto the same string must still attribute to a
/// single stage, and to either one user group or all of them.
pub fn render(raw: &str, ctx: &TemplateContext<'_>) -> Result<Vec<(String, ExprAttr)>> {
    let template_error = |reason: String| GrupinError::Template {
        expr: raw.to_string(),
        reason,
    };

    let by_dtap: Vec<(String, Option<&Identifier>)> = if raw.contains(DTAP_PLACEHOLDER) {
        if ctx.dtaps.is_empty() {
            return Err(template_error(format!(
                "{} used but no deployment stages are registered",
                DTAP_PLACEHOLDER
            )));
        }
        ctx.dtaps
            .all()
            .map(|d| (raw.replace(DTAP_PLACEHOLDER, ctx.dtaps.rendering(d)), Some(d)))
            .collect()
    } else {
        vec![(raw.to_string(), None)]
    };

    let mut groups: BTreeMap<String, (BTreeSet<Option<&Identifier>>, BTreeSet<Option<&Identifier>>)> =
        BTreeMap::new();

    for (rendered, dtap) in by_dtap {
        if rendered.contains(USER_GROUP_PLACEHOLDER) {
            if ctx.user_groups.is_empty() {
                return Err(template_error(format!(
                    "{} used but no user groups are registered",
                    USER_GROUP_PLACEHOLDER
                )));
            }
            for ug in ctx.user_groups {
                let entry = groups
                    .entry(rendered.replace(USER_GROUP_PLACEHOLDER, ug.as_str()))
                    .or_default();
                entry.0.insert(dtap);
                entry.1.insert(Some(ug));
            }
        } else {
            let entry = groups.entry(rendered).or_default();
            entry.0.insert(dtap);
            entry.1.insert(None);
        }
    }

    let mut out = Vec::with_capacity(groups.len());
    for (rendered, (dtaps, user_groups)) in groups {
        if dtaps.len() > 1 {
            return Err(template_error(format!(
                "'{}' is rendered for more than one deployment stage",
                rendered
            )));
        }
        let dtap = dtaps.into_iter().next().flatten().cloned();

        // Within one stage every user group renders a distinct string, and a
        // collision across stages already failed above. So one raw expression
        // always lands in the first two arms; the rest guard `render` against
        // placeholder handling that merges renderings.
        let named: Vec<&Identifier> = user_groups.iter().flatten().copied().collect();
        let user_group = match named.len() {
            0 => None,
            1 if user_groups.len() == 1 => Some(named[0].clone()),
            n if n == ctx.user_groups.len() => None,
            _ => {
                return Err(template_error(format!(
                    "'{}' is rendered for {} of {} user groups",
                    rendered,
                    named.len(),
                    ctx.user_groups.len()
                )))
            }
        };

        out.push((rendered, ExprAttr { dtap, user_group }));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn stages(names: &[&str]) -> DtapSpec {
        DtapSpec::new(None, names.iter().map(|n| id(n))).unwrap()
    }

    fn groups(names: &[&str]) -> BTreeSet<Identifier> {
        names.iter().map(|n| id(n)).collect()
    }

    #[test]
    fn test_no_placeholders() {
        let dtaps = stages(&["dev", "prod"]);
        let ugs = groups(&["analysts"]);
        let out = render("db.s.t", &TemplateContext::new(&dtaps, &ugs)).unwrap();
        assert_eq!(out, vec![("db.s.t".to_string(), ExprAttr::all())]);
    }

    #[test]
    fn test_dtap_expansion() {
        let dtaps = stages(&["dev", "prod"]);
        let ugs = groups(&["analysts", "finance"]);
        let out = render("db_[dtap].s.*", &TemplateContext::new(&dtaps, &ugs)).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, "db_dev.s.*");
        assert_eq!(out[0].1, ExprAttr::for_dtap(id("dev")));
        assert_eq!(out[1].0, "db_prod.s.*");
        assert_eq!(out[1].1, ExprAttr::for_dtap(id("prod")));
    }

    #[test]
    fn test_user_group_expansion_inside_quotes() {
        let dtaps = stages(&["dev"]);
        let ugs = groups(&["analysts", "finance"]);
        let out = render(
            "db_[dtap].\"UG_[user_group]\".*",
            &TemplateContext::new(&dtaps, &ugs),
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, "db_dev.\"UG_analysts\".*");
        assert_eq!(out[0].1.dtap, Some(id("dev")));
        assert_eq!(out[0].1.user_group, Some(id("analysts")));
        assert_eq!(out[1].1.user_group, Some(id("finance")));
    }

    #[test]
    fn test_placeholder_without_registry() {
        let dtaps = DtapSpec::default();
        let ugs = BTreeSet::new();
        let ctx = TemplateContext::new(&dtaps, &ugs);
        assert!(matches!(
            render("db_[dtap].s.t", &ctx),
            Err(GrupinError::Template { .. })
        ));
        assert!(matches!(
            render("db.[user_group].t", &ctx),
            Err(GrupinError::Template { .. })
        ));
    }

    #[test]
    fn test_colliding_stage_renderings_are_ambiguous() {
        let dtaps = DtapSpec::new(Some(id("prd")), [id("acc")])
            .unwrap()
            .with_rendering("prd", "x")
            .unwrap()
            .with_rendering("acc", "x")
            .unwrap();
        let ugs = BTreeSet::new();
        let err = render("db_[dtap].s.t", &TemplateContext::new(&dtaps, &ugs)).unwrap_err();
        assert!(err.to_string().contains("more than one deployment stage"));
    }
}
