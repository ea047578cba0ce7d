//! Single name components
//!
//! An [`ExprPart`] is one position of a hierarchical expression (database,
//! schema, object or column). Unquoted parts are case-insensitive and may end
//! in a single `*` wildcard; quoted parts are exact, case-sensitive literals.

use crate::error::{GrupinError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Name-matching predicate for one hierarchy level
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprPart {
    value: String,
    quoted: bool,
}

impl ExprPart {
    pub const WILDCARD: char = '*';

    /// Maximum length of a quoted identifier
    pub const MAX_QUOTED_LEN: usize = 255;

    const UNQUOTED_PATTERN: &'static str = r"^(\*|[a-z_][a-z0-9_$]*\*?)$";

    /// Build an unquoted part. The value is lower-cased before validation.
    ///
    /// # Examples
    ///
    /// ```
    /// use grupin_rs::ExprPart;
    ///
    /// let part = ExprPart::unquoted("Sales*").unwrap();
    /// assert_eq!(part.value(), "sales*");
    /// assert!(part.has_wildcard());
    ///
    /// assert!(ExprPart::unquoted("sa*les").is_err());
    /// ```
    pub fn unquoted(value: &str) -> Result<Self> {
        let value = value.to_lowercase();

        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| Regex::new(Self::UNQUOTED_PATTERN).expect("unquoted pattern"));
        if !re.is_match(&value) {
            return Err(GrupinError::invalid_expression(
                &value,
                "unquoted identifiers must match [a-z_][a-z0-9_$]* with an optional trailing '*'",
            ));
        }

        Ok(ExprPart {
            value,
            quoted: false,
        })
    }

    /// Build a quoted part. Wildcards are not interpreted inside quotes.
    pub fn quoted(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(GrupinError::invalid_expression(
                "\"\"",
                "quoted identifiers cannot be empty",
            ));
        }
        if value.chars().count() > Self::MAX_QUOTED_LEN {
            return Err(GrupinError::invalid_expression(
                value,
                format!(
                    "quoted identifiers are limited to {} characters",
                    Self::MAX_QUOTED_LEN
                ),
            ));
        }

        Ok(ExprPart {
            value: value.to_string(),
            quoted: true,
        })
    }

    /// The part that matches every name
    pub fn any() -> Self {
        ExprPart {
            value: Self::WILDCARD.to_string(),
            quoted: false,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn has_wildcard(&self) -> bool {
        !self.quoted && self.value.ends_with(Self::WILDCARD)
    }

    /// True for a bare `*`
    pub fn matches_everything(&self) -> bool {
        !self.quoted && self.value.len() == 1 && self.has_wildcard()
    }

    /// Fixed prefix of a wildcarded part, or the whole value otherwise
    fn prefix(&self) -> &str {
        if self.has_wildcard() {
            &self.value[..self.value.len() - 1]
        } else {
            &self.value
        }
    }

    /// Every name matched by `self` is also matched by `other`.
    pub fn subset_of(&self, other: &ExprPart) -> bool {
        match (self.quoted, other.quoted) {
            (true, true) => self.value == other.value,
            // An unquoted pattern can always match more than one literal
            (false, true) => false,
            (true, false) => other.matches(&self.value),
            (false, false) => {
                if self.value == other.value {
                    return true;
                }
                if !other.has_wildcard() {
                    return false;
                }
                // "abc" and "abc*" are both inside "ab*"; "ab*" is not inside "abc*"
                self.prefix().starts_with(other.prefix())
            }
        }
    }

    /// Suffix-only wildcards never overlap partially: either one side
    /// contains the other or they share no name at all.
    pub fn disjoint(&self, other: &ExprPart) -> bool {
        !self.subset_of(other) && !other.subset_of(self)
    }

    /// Test a concrete identifier as reported by the platform.
    pub fn matches(&self, name: &str) -> bool {
        if self.quoted {
            return self.value == name;
        }
        let name = name.to_lowercase();
        if self.has_wildcard() {
            name.starts_with(self.prefix())
        } else {
            name == self.value
        }
    }

    /// Regex equivalent of [`ExprPart::matches`], used by the matching engine.
    pub fn regex_source(&self) -> String {
        if self.quoted {
            format!("^{}$", regex::escape(&self.value))
        } else if self.has_wildcard() {
            format!("(?i)^{}.*$", regex::escape(self.prefix()))
        } else {
            format!("(?i)^{}$", regex::escape(&self.value))
        }
    }

    /// Render the part as a SQL identifier for a concrete (non-wildcard) name.
    pub fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

impl fmt::Display for ExprPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "{}", Self::quote_identifier(&self.value))
        } else {
            write!(f, "{}", self.value)
        }
    }
}

impl Serialize for ExprPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uq(s: &str) -> ExprPart {
        ExprPart::unquoted(s).unwrap()
    }

    fn q(s: &str) -> ExprPart {
        ExprPart::quoted(s).unwrap()
    }

    #[test]
    fn test_wildcard_subset_table() {
        assert!(uq("abc").subset_of(&uq("abc*")));
        assert!(!uq("abc*").subset_of(&uq("abc")));
        assert!(uq("abc*").subset_of(&uq("ab*")));
        assert!(!uq("ab*").subset_of(&uq("abc*")));
        assert!(uq("a*").subset_of(&uq("*")));
        assert!(!uq("*").subset_of(&uq("a*")));
    }

    #[test]
    fn test_quoted_subset_table() {
        assert!(q("A").subset_of(&uq("a")));
        assert!(!uq("a").subset_of(&q("a")));
        assert!(q("a").subset_of(&q("a")));
        assert!(!q("a").subset_of(&q("A")));
    }

    #[test]
    fn test_quoted_inside_wildcard() {
        assert!(q("Sales_2024").subset_of(&uq("sales*")));
        assert!(!q("Orders").subset_of(&uq("sales*")));
        assert!(!q("sales*").subset_of(&uq("sales")));
    }

    #[test]
    fn test_disjoint() {
        assert!(uq("abc").disjoint(&uq("abd")));
        assert!(uq("ab*").disjoint(&uq("ac*")));
        assert!(!uq("ab*").disjoint(&uq("abc")));
        assert!(!uq("*").disjoint(&q("Anything")));
        assert!(q("A").disjoint(&q("a")));
    }

    #[test]
    fn test_unquoted_normalizes_case() {
        assert_eq!(uq("SALES").value(), "sales");
        assert_eq!(uq("Sa$les_1*").value(), "sa$les_1*");
    }

    #[test]
    fn test_invalid_parts() {
        assert!(ExprPart::unquoted("").is_err());
        assert!(ExprPart::unquoted("1abc").is_err());
        assert!(ExprPart::unquoted("a*b").is_err());
        assert!(ExprPart::unquoted("a**").is_err());
        assert!(ExprPart::unquoted("a-b").is_err());
        assert!(ExprPart::quoted("").is_err());
        assert!(ExprPart::quoted(&"x".repeat(256)).is_err());
        assert!(ExprPart::quoted(&"x".repeat(255)).is_ok());
    }

    #[test]
    fn test_matches_names() {
        assert!(uq("sales*").matches("SALES_EU"));
        assert!(uq("sales").matches("Sales"));
        assert!(!uq("sales").matches("SALES_EU"));
        assert!(q("Sales").matches("Sales"));
        assert!(!q("Sales").matches("SALES"));
        assert!(uq("*").matches("whatever"));
    }

    #[test]
    fn test_regex_source_agrees_with_matches() {
        for part in [uq("sales*"), uq("sales"), q("Sa.les"), uq("*")] {
            let re = Regex::new(&part.regex_source()).unwrap();
            for name in ["SALES", "sales_eu", "Sa.les", "SaXles", "orders"] {
                assert_eq!(re.is_match(name), part.matches(name), "{} vs {}", part, name);
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(uq("Sales*").to_string(), "sales*");
        assert_eq!(q("My \"Db\"").to_string(), "\"My \"\"Db\"\"\"");
    }
}
