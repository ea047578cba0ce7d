//! Grants on concrete objects and on future objects

use super::{ObjectType, Privilege};
use crate::error::{GrupinError, Result};
use crate::expr::{split_components, ExprPart};
use serde::Serialize;
use std::fmt;

/// Concrete path of a securable object, names as the platform stores them
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectPath {
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

impl ObjectPath {
    pub fn database(database: impl Into<String>) -> Self {
        ObjectPath {
            database: database.into(),
            schema: None,
            object: None,
        }
    }

    pub fn schema(database: impl Into<String>, schema: impl Into<String>) -> Self {
        ObjectPath {
            database: database.into(),
            schema: Some(schema.into()),
            object: None,
        }
    }

    pub fn object(
        database: impl Into<String>,
        schema: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        ObjectPath {
            database: database.into(),
            schema: Some(schema.into()),
            object: Some(object.into()),
        }
    }

    /// Parse a dotted name as reported by `SHOW GRANTS`. Quoted components
    /// keep their text; unquoted ones are taken verbatim.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_components(raw)?.into_iter().map(|(text, _)| text);
        let path = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(d), None, None, None) => ObjectPath::database(d),
            (Some(d), Some(s), None, None) => ObjectPath::schema(d, s),
            (Some(d), Some(s), Some(o), None) => ObjectPath::object(d, s, o),
            _ => {
                return Err(GrupinError::Backend(format!(
                    "unexpected object name '{}'",
                    raw
                )))
            }
        };
        if path.names().iter().any(|n| n.is_empty()) {
            return Err(GrupinError::Backend(format!(
                "unexpected object name '{}'",
                raw
            )));
        }
        Ok(path)
    }

    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.database.as_str())
            .chain(self.schema.as_deref())
            .chain(self.object.as_deref())
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.names().len()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self
            .names()
            .into_iter()
            .map(ExprPart::quote_identifier)
            .collect();
        f.write_str(&quoted.join("."))
    }
}

/// A privilege on one existing object, held by a database role
///
/// The role lives in the object's database, so only its name is kept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Grant {
    pub privilege: Privilege,
    pub on: ObjectType,
    pub path: ObjectPath,
    pub role: String,
    pub grant_option: bool,
}

impl Grant {
    pub fn new(privilege: Privilege, on: ObjectType, path: ObjectPath, role: &str) -> Self {
        Grant {
            privilege,
            on,
            path,
            role: role.to_string(),
            grant_option: false,
        }
    }

    /// Same privilege on the same object, regardless of grant option.
    pub fn same_target(&self, other: &Grant) -> bool {
        self.privilege == other.privilege
            && self.on == other.on
            && self.path == other.path
            && self.role.eq_ignore_ascii_case(&other.role)
    }
}

/// A privilege on objects not yet created inside a database or schema
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FutureGrant {
    pub privilege: Privilege,
    pub on: ObjectType,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub role: String,
}

impl FutureGrant {
    /// `IN SCHEMA "db"."schema"` or `IN DATABASE "db"`
    pub fn container(&self) -> String {
        match &self.schema {
            Some(s) => format!(
                "SCHEMA {}",
                ObjectPath::schema(self.database.clone(), s.clone())
            ),
            None => format!("DATABASE {}", ObjectPath::database(self.database.clone())),
        }
    }

    pub fn same_target(&self, other: &FutureGrant) -> bool {
        self.privilege == other.privilege
            && self.on == other.on
            && self.database == other.database
            && self.schema == other.schema
            && self.role.eq_ignore_ascii_case(&other.role)
    }
}
