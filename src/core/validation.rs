//! Validation for declaration identifiers
//!
//! Product, interface, deployment stage, user group and service ids all end up
//! inside generated role names, so they share one strict grammar:
//! lowercase letters and digits, single underscores, starting with a letter.
//! Keeping `__` out of identifiers lets role names use it as a separator.

use crate::error::{GrupinError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A validated declaration identifier
///
/// # Rules
/// - Starts with a lowercase letter
/// - Lowercase letters (a-z), digits (0-9) and underscores only
/// - No leading, trailing or consecutive underscores
/// - Length: 1-128 characters
///
/// # Examples
///
/// ```
/// use grupin_rs::Identifier;
///
/// let id = Identifier::new("sales_orders").unwrap();
/// assert_eq!(id.as_str(), "sales_orders");
///
/// assert!(Identifier::new("Sales").is_err()); // uppercase
/// assert!(Identifier::new("sales__orders").is_err()); // double underscore
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Pattern for valid identifiers
    const PATTERN: &'static str = r"^[a-z](_?[a-z0-9])*$";

    const MAX_LENGTH: usize = 128;

    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier(&id)?;
        Ok(Identifier(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Check a string against the identifier grammar without allocating.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > Identifier::MAX_LENGTH {
        return Err(GrupinError::InvalidIdentifier(id.to_string()));
    }

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(Identifier::PATTERN).expect("identifier pattern"));
    if !re.is_match(id) {
        return Err(GrupinError::InvalidIdentifier(id.to_string()));
    }

    Ok(())
}

impl TryFrom<String> for Identifier {
    type Error = GrupinError;

    fn try_from(value: String) -> Result<Self> {
        Identifier::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
