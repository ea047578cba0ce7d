//! Access modes, privileges and securable object types

use serde::Serialize;
use std::fmt;

/// Access mode a database role grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Read,
}

impl Mode {
    pub const ALL: [Mode; 1] = [Mode::Read];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Read => "read",
        }
    }

    /// Case-insensitive parse of the role-name component.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
    }

    /// The privilege this mode needs on one kind of object.
    pub fn privilege_on(&self, on: ObjectType) -> Privilege {
        match (self, on) {
            (Mode::Read, ObjectType::Database | ObjectType::Schema) => Privilege::Usage,
            (Mode::Read, ObjectType::Table | ObjectType::View) => Privilege::Select,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privileges the reconciler manages. Anything else the platform reports
/// (ownership, write privileges) is outside its concern and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Privilege {
    Usage,
    Select,
}

impl Privilege {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Privilege::Usage => "USAGE",
            Privilege::Select => "SELECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USAGE" => Some(Privilege::Usage),
            "SELECT" => Some(Privilege::Select),
            _ => None,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Kind of securable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    Database,
    Schema,
    Table,
    View,
}

impl ObjectType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ObjectType::Database => "DATABASE",
            ObjectType::Schema => "SCHEMA",
            ObjectType::Table => "TABLE",
            ObjectType::View => "VIEW",
        }
    }

    /// Plural form used by future grants (`ON FUTURE TABLES`).
    pub fn plural_sql(&self) -> &'static str {
        match self {
            ObjectType::Database => "DATABASES",
            ObjectType::Schema => "SCHEMAS",
            ObjectType::Table => "TABLES",
            ObjectType::View => "VIEWS",
        }
    }

    /// Accepts both the singular and the plural form.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DATABASE" | "DATABASES" => Some(ObjectType::Database),
            "SCHEMA" | "SCHEMAS" => Some(ObjectType::Schema),
            "TABLE" | "TABLES" => Some(ObjectType::Table),
            "VIEW" | "VIEWS" => Some(ObjectType::View),
            _ => None,
        }
    }

    /// Number of path components an object of this type has.
    pub fn depth(&self) -> usize {
        match self {
            ObjectType::Database => 1,
            ObjectType::Schema => 2,
            ObjectType::Table | ObjectType::View => 3,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}
