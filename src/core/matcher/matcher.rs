//! Validated include/exclude expression sets

use super::template::{render, TemplateContext};
use super::ExprAttr;
use crate::error::{GrupinError, Result};
use crate::expr::{find_overlap, ColumnExpr, Expression, ObjExpr};
use serde::Serialize;
use std::collections::BTreeMap;

/// Include/exclude pair of expression sets
///
/// Invariants (checked at construction):
/// - include expressions are pairwise disjoint
/// - exclude expressions are pairwise disjoint
/// - every exclude is a strict subset of exactly one include
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matcher<E: Expression> {
    include: BTreeMap<E, ExprAttr>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    exclude: BTreeMap<E, ExprAttr>,
    #[serde(skip)]
    superset: BTreeMap<E, E>,
}

pub type ObjMatcher = Matcher<ObjExpr>;
pub type ColumnMatcher = Matcher<ColumnExpr>;

impl<E: Expression> Default for Matcher<E> {
    fn default() -> Self {
        Matcher {
            include: BTreeMap::new(),
            exclude: BTreeMap::new(),
            superset: BTreeMap::new(),
        }
    }
}

impl<E: Expression> Matcher<E> {
    /// Render, parse and validate raw include/exclude expressions.
    ///
    /// # Examples
    ///
    /// ```
    /// use grupin_rs::{DtapSpec, ObjMatcher, TemplateContext};
    /// use std::collections::BTreeSet;
    ///
    /// let dtaps = DtapSpec::default();
    /// let groups = BTreeSet::new();
    /// let ctx = TemplateContext::new(&dtaps, &groups);
    ///
    /// let m = ObjMatcher::new(&["db1.*.*"], &["db1.staging.*"], &ctx).unwrap();
    /// assert!(m.covers(&["DB1", "SALES", "ORDERS"]));
    /// assert!(!m.covers(&["DB1", "STAGING", "ORDERS"]));
    ///
    /// // An exclude must sit strictly inside an include
    /// assert!(ObjMatcher::new(&["db1.*.*"], &["db2.x.*"], &ctx).is_err());
    /// ```
    pub fn new<S: AsRef<str>>(
        include: &[S],
        exclude: &[S],
        ctx: &TemplateContext<'_>,
    ) -> Result<Self> {
        let include = Self::parse_all(include, ctx)?;
        let exclude = Self::parse_all(exclude, ctx)?;
        Self::from_exprs(include, exclude)
    }

    fn parse_all<S: AsRef<str>>(
        raw: &[S],
        ctx: &TemplateContext<'_>,
    ) -> Result<BTreeMap<E, ExprAttr>> {
        let mut out = BTreeMap::new();
        for r in raw {
            for (rendered, attr) in render(r.as_ref(), ctx)? {
                let expr = E::parse(&rendered)?;
                if out.contains_key(&expr) {
                    return Err(GrupinError::DuplicateExpression(expr.to_string()));
                }
                out.insert(expr, attr);
            }
        }
        Ok(out)
    }

    /// Validate already-parsed expressions.
    pub fn from_exprs(
        include: BTreeMap<E, ExprAttr>,
        exclude: BTreeMap<E, ExprAttr>,
    ) -> Result<Self> {
        // Superset mapping first: with overlapping includes an exclude can
        // land in several of them, which deserves the more precise error.
        let mut superset = BTreeMap::new();
        for x in exclude.keys() {
            let candidates: Vec<&E> = include.keys().filter(|i| x.strict_subset_of(i)).collect();
            match candidates.as_slice() {
                [] => return Err(GrupinError::OrphanExclude(x.to_string())),
                [only] => {
                    superset.insert(x.clone(), (*only).clone());
                }
                many => {
                    return Err(GrupinError::AmbiguousExclude {
                        exclude: x.to_string(),
                        includes: many
                            .iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                }
            }
        }

        if let Some((a, b)) = find_overlap(include.keys()) {
            return Err(GrupinError::Overlap(a.to_string(), b.to_string()));
        }
        if let Some((a, b)) = find_overlap(exclude.keys()) {
            return Err(GrupinError::Overlap(a.to_string(), b.to_string()));
        }

        Ok(Matcher {
            include,
            exclude,
            superset,
        })
    }

    pub fn include(&self) -> &BTreeMap<E, ExprAttr> {
        &self.include
    }

    pub fn exclude(&self) -> &BTreeMap<E, ExprAttr> {
        &self.exclude
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
    }

    /// The include expression an exclude expression is carved out of.
    pub fn superset_of(&self, exclude: &E) -> Option<&E> {
        self.superset.get(exclude)
    }

    /// Excludes carved out of one include expression.
    pub fn excludes_of<'a>(&'a self, include: &'a E) -> impl Iterator<Item = &'a E> + 'a {
        self.superset
            .iter()
            .filter(move |(_, sup)| *sup == include)
            .map(|(x, _)| x)
    }

    /// Restrict to expressions that apply to one deployment stage.
    pub fn for_dtap(&self, dtap: &str) -> Self {
        let include: BTreeMap<E, ExprAttr> = self
            .include
            .iter()
            .filter(|(_, attr)| attr.applies_to_dtap(dtap))
            .map(|(e, a)| (e.clone(), a.clone()))
            .collect();

        let mut exclude = BTreeMap::new();
        let mut superset = BTreeMap::new();
        for (x, attr) in &self.exclude {
            let Some(sup) = self.superset.get(x) else {
                continue;
            };
            if include.contains_key(sup) && attr.applies_to_dtap(dtap) {
                exclude.insert(x.clone(), attr.clone());
                superset.insert(x.clone(), sup.clone());
            }
        }

        Matcher {
            include,
            exclude,
            superset,
        }
    }

    /// Whether any include of `self` and any include of `other` share a
    /// region that neither side excludes. Returns the witnessing pair.
    pub fn overlap_with<'a>(&'a self, other: &'a Self) -> Option<(&'a E, &'a E)> {
        for a in self.include.keys() {
            for b in other.include.keys() {
                let Some(region) = a.intersection(b) else {
                    continue;
                };
                let carved = self.excludes_of(a).any(|x| region.subset_of(x))
                    || other.excludes_of(b).any(|x| region.subset_of(x));
                if !carved {
                    return Some((a, b));
                }
            }
        }
        None
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.overlap_with(other).is_some()
    }

    /// First include of `self` that reaches outside the region of `outer`.
    ///
    /// An include is contained when it is a subset of some include of
    /// `outer` and every exclude of that include it touches is carved out of
    /// it again by one of its own excludes.
    pub fn outside_of<'a>(&'a self, outer: &Self) -> Option<&'a E> {
        self.include.keys().find(|inner| {
            let Some(sup) = outer.include.keys().find(|o| inner.subset_of(o)) else {
                return true;
            };
            outer.excludes_of(sup).any(|x| match inner.intersection(x) {
                Some(region) => !self.excludes_of(inner).any(|own| region.subset_of(own)),
                None => false,
            })
        })
    }

    /// Whether a concrete name path lies inside the matched region.
    pub fn covers(&self, names: &[&str]) -> bool {
        self.include.keys().any(|inc| {
            inc.matches_path(names) && !self.excludes_of(inc).any(|x| x.matches_path(names))
        })
    }
}

impl ColumnMatcher {
    /// Whether any column include lands on an object this object matcher
    /// exposes. Column excludes never carve objects away.
    pub fn overlaps_objects(&self, objects: &ObjMatcher) -> bool {
        self.include.keys().any(|col| {
            let projected = col.object_expr();
            objects.include.keys().any(|inc| match projected.intersection(inc) {
                Some(region) => !objects.excludes_of(inc).any(|x| region.subset_of(x)),
                None => false,
            })
        })
    }
}
