//! Hierarchical expressions
//!
//! An expression is a fixed-length tuple of [`ExprPart`]s and stands for the
//! cartesian product of the names each part matches. Set relations lift
//! position-wise: subset is AND over positions, disjointness is OR.

use super::parse::parse_parts;
use super::ExprPart;
use crate::error::{GrupinError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Shared behaviour of object and column expressions
pub trait Expression:
    Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Serialize + Send + Sync + 'static
{
    /// Number of hierarchy levels
    const ARITY: usize;

    /// Human-readable kind, used in error messages
    const KIND: &'static str;

    fn parts(&self) -> &[ExprPart];

    fn from_parts(parts: Vec<ExprPart>) -> Result<Self>;

    /// Parse the dotted/quoted syntax.
    fn parse(raw: &str) -> Result<Self> {
        Self::from_parts(parse_parts(raw, Self::ARITY)?)
    }

    fn subset_of(&self, other: &Self) -> bool {
        self.parts()
            .iter()
            .zip(other.parts())
            .all(|(a, b)| a.subset_of(b))
    }

    /// Two boxes are disjoint when they fail to overlap on any single axis.
    fn disjoint(&self, other: &Self) -> bool {
        self.parts()
            .iter()
            .zip(other.parts())
            .any(|(a, b)| a.disjoint(b))
    }

    fn strict_subset_of(&self, other: &Self) -> bool {
        self != other && self.subset_of(other)
    }

    /// The region matched by both expressions, if any.
    ///
    /// Because parts are either nested or disjoint, the overlap of two
    /// expressions is itself an expression: the smaller part on each axis.
    fn intersection(&self, other: &Self) -> Option<Self> {
        let mut parts = Vec::with_capacity(Self::ARITY);
        for (a, b) in self.parts().iter().zip(other.parts()) {
            if a.subset_of(b) {
                parts.push(a.clone());
            } else if b.subset_of(a) {
                parts.push(b.clone());
            } else {
                return None;
            }
        }
        Self::from_parts(parts).ok()
    }

    /// Test a concrete name path (one name per level).
    fn matches_path(&self, names: &[&str]) -> bool {
        names.len() == Self::ARITY
            && self
                .parts()
                .iter()
                .zip(names)
                .all(|(part, name)| part.matches(name))
    }
}

/// Find the first overlapping pair, if any. O(n²), used at declaration time.
pub fn find_overlap<'a, E: Expression>(
    exprs: impl IntoIterator<Item = &'a E>,
) -> Option<(&'a E, &'a E)> {
    let exprs: Vec<&E> = exprs.into_iter().collect();
    for (i, a) in exprs.iter().enumerate() {
        for b in &exprs[i + 1..] {
            if !a.disjoint(b) {
                return Some((*a, *b));
            }
        }
    }
    None
}

/// Pairwise disjointness of a set of expressions.
pub fn all_disjoint<'a, E: Expression>(exprs: impl IntoIterator<Item = &'a E>) -> bool {
    find_overlap(exprs).is_none()
}

fn write_parts(f: &mut fmt::Formatter<'_>, parts: &[ExprPart]) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, ".")?;
        }
        write!(f, "{}", part)?;
    }
    Ok(())
}

fn arity_error(kind: &str, arity: usize, found: usize) -> GrupinError {
    GrupinError::invalid_expression(
        kind,
        format!("expected {} components, found {}", arity, found),
    )
}

/// `database.schema.object` expression
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjExpr {
    parts: [ExprPart; 3],
}

impl ObjExpr {
    pub fn new(database: ExprPart, schema: ExprPart, object: ExprPart) -> Self {
        ObjExpr {
            parts: [database, schema, object],
        }
    }

    pub fn database(&self) -> &ExprPart {
        &self.parts[0]
    }

    pub fn schema(&self) -> &ExprPart {
        &self.parts[1]
    }

    pub fn object(&self) -> &ExprPart {
        &self.parts[2]
    }
}

impl Expression for ObjExpr {
    const ARITY: usize = 3;
    const KIND: &'static str = "object expression";

    fn parts(&self) -> &[ExprPart] {
        &self.parts
    }

    fn from_parts(parts: Vec<ExprPart>) -> Result<Self> {
        let found = parts.len();
        let parts: [ExprPart; 3] = parts
            .try_into()
            .map_err(|_| arity_error(Self::KIND, Self::ARITY, found))?;
        Ok(ObjExpr { parts })
    }
}

/// `database.schema.object.column` expression
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnExpr {
    parts: [ExprPart; 4],
}

impl ColumnExpr {
    pub fn column(&self) -> &ExprPart {
        &self.parts[3]
    }

    /// The object-level projection of this column expression.
    pub fn object_expr(&self) -> ObjExpr {
        ObjExpr::new(
            self.parts[0].clone(),
            self.parts[1].clone(),
            self.parts[2].clone(),
        )
    }
}

impl Expression for ColumnExpr {
    const ARITY: usize = 4;
    const KIND: &'static str = "column expression";

    fn parts(&self) -> &[ExprPart] {
        &self.parts
    }

    fn from_parts(parts: Vec<ExprPart>) -> Result<Self> {
        let found = parts.len();
        let parts: [ExprPart; 4] = parts
            .try_into()
            .map_err(|_| arity_error(Self::KIND, Self::ARITY, found))?;
        Ok(ColumnExpr { parts })
    }
}

macro_rules! expression_traits {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_parts(f, &self.parts)
            }
        }

        impl FromStr for $ty {
            type Err = GrupinError;

            fn from_str(s: &str) -> Result<Self> {
                <$ty as Expression>::parse(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

expression_traits!(ObjExpr);
expression_traits!(ColumnExpr);
