//! Deterministic role identities
//!
//! Every role the reconciler manages is named from its identity, so creating
//! one is idempotent and any managed role reported by the platform can be
//! parsed back into the unit it belongs to:
//!
//! ```text
//! database role: "{database}".{prefix}{product}__{stage}[__{infix}{interface}]__{mode}
//! account role:  {prefix}{product}__{stage}__{mode}
//! ```

use super::Mode;
use crate::error::{GrupinError, Result};
use crate::expr::{split_components, ExprPart};
use crate::validation::Identifier;
use serde::Serialize;

/// Per-database role granting one mode on one product interface at one stage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DatabaseRole {
    pub database: String,
    pub product: Identifier,
    pub dtap: Identifier,
    /// `None` for the product-level interface
    pub interface: Option<Identifier>,
    pub mode: Mode,
}

/// Account-wide role of a consuming product at one stage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AccountRole {
    pub product: Identifier,
    pub dtap: Identifier,
    pub mode: Mode,
}

/// Naming scheme for generated roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleNaming {
    prefix: String,
    interface_infix: String,
}

impl RoleNaming {
    pub const SEPARATOR: &'static str = "__";

    pub fn new(prefix: impl Into<String>, interface_infix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into().to_lowercase();
        let interface_infix = interface_infix.into().to_lowercase();

        if prefix.is_empty() || !Self::valid_component(&prefix) {
            return Err(GrupinError::Config(format!(
                "invalid role prefix '{}'",
                prefix
            )));
        }
        if !interface_infix.is_empty() && !Self::valid_component(&interface_infix) {
            return Err(GrupinError::Config(format!(
                "invalid interface infix '{}'",
                interface_infix
            )));
        }

        Ok(RoleNaming {
            prefix,
            interface_infix,
        })
    }

    fn valid_component(s: &str) -> bool {
        s.starts_with(|c: char| c.is_ascii_lowercase())
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !s.contains(Self::SEPARATOR)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn interface_infix(&self) -> &str {
        &self.interface_infix
    }

    /// Unqualified name of a database role.
    pub fn database_role_name(&self, role: &DatabaseRole) -> String {
        let mut name = format!("{}{}{}{}", self.prefix, role.product, Self::SEPARATOR, role.dtap);
        if let Some(iface) = &role.interface {
            name.push_str(Self::SEPARATOR);
            name.push_str(&self.interface_infix);
            name.push_str(iface.as_str());
        }
        name.push_str(Self::SEPARATOR);
        name.push_str(role.mode.as_str());
        name
    }

    /// Database-qualified name, `"{database}".{name}`.
    pub fn render_database_role(&self, role: &DatabaseRole) -> String {
        format!(
            "{}.{}",
            ExprPart::quote_identifier(&role.database),
            self.database_role_name(role)
        )
    }

    pub fn account_role_name(&self, role: &AccountRole) -> String {
        format!(
            "{}{}{sep}{}{sep}{}",
            self.prefix,
            role.product,
            role.dtap,
            role.mode,
            sep = Self::SEPARATOR
        )
    }

    /// Parse a database-qualified role name. The role name part is
    /// case-insensitive, since the platform reports it upper-cased.
    pub fn parse_database_role(&self, raw: &str) -> Result<DatabaseRole> {
        let invalid = || GrupinError::InvalidRoleName(raw.to_string());
        let components = split_components(raw).map_err(|_| invalid())?;
        let [(database, _), (name, _)] = <[(String, bool); 2]>::try_from(components)
            .map_err(|_| invalid())?;
        if database.is_empty() {
            return Err(invalid());
        }

        let (product, dtap, interface, mode) = self.parse_name(&name).ok_or_else(invalid)?;
        Ok(DatabaseRole {
            database,
            product,
            dtap,
            interface,
            mode,
        })
    }

    /// Parse the unqualified name of a database role living in `database`.
    pub fn parse_database_role_name(&self, database: &str, name: &str) -> Result<DatabaseRole> {
        let (product, dtap, interface, mode) = self
            .parse_name(name)
            .ok_or_else(|| GrupinError::InvalidRoleName(name.to_string()))?;
        Ok(DatabaseRole {
            database: database.to_string(),
            product,
            dtap,
            interface,
            mode,
        })
    }

    pub fn parse_account_role(&self, name: &str) -> Result<AccountRole> {
        match self.parse_name(name) {
            Some((product, dtap, None, mode)) => Ok(AccountRole {
                product,
                dtap,
                mode,
            }),
            _ => Err(GrupinError::InvalidRoleName(name.to_string())),
        }
    }

    /// Whether an account role name belongs to this naming scheme.
    pub fn is_managed_account_role(&self, name: &str) -> bool {
        self.parse_account_role(name).is_ok()
    }

    #[allow(clippy::type_complexity)]
    fn parse_name(
        &self,
        name: &str,
    ) -> Option<(Identifier, Identifier, Option<Identifier>, Mode)> {
        let name = name.to_lowercase();
        let rest = name.strip_prefix(&self.prefix)?;
        let parts: Vec<&str> = rest.split(Self::SEPARATOR).collect();

        let (product, dtap, interface, mode) = match parts.as_slice() {
            [product, dtap, mode] => (*product, *dtap, None, *mode),
            [product, dtap, iface, mode] => {
                (*product, *dtap, Some(iface.strip_prefix(&self.interface_infix)?), *mode)
            }
            _ => return None,
        };

        Some((
            Identifier::new(product).ok()?,
            Identifier::new(dtap).ok()?,
            match interface {
                Some(i) => Some(Identifier::new(i).ok()?),
                None => None,
            },
            Mode::parse(mode)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn naming() -> RoleNaming {
        RoleNaming::new("grp_", "if_").unwrap()
    }

    #[test]
    fn test_database_role_rendering() {
        let role = DatabaseRole {
            database: "SALES_PRD".into(),
            product: id("sales"),
            dtap: id("prd"),
            interface: Some(id("reporting")),
            mode: Mode::Read,
        };
        assert_eq!(
            naming().database_role_name(&role),
            "grp_sales__prd__if_reporting__read"
        );
        assert_eq!(
            naming().render_database_role(&role),
            "\"SALES_PRD\".grp_sales__prd__if_reporting__read"
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let role = naming()
            .parse_database_role("\"SALES_PRD\".GRP_SALES__PRD__READ")
            .unwrap();
        assert_eq!(role.database, "SALES_PRD");
        assert_eq!(role.product, id("sales"));
        assert_eq!(role.dtap, id("prd"));
        assert_eq!(role.interface, None);
        assert_eq!(role.mode, Mode::Read);

        // Unquoted database as reported by SHOW commands
        let role = naming()
            .parse_database_role("SALES_PRD.GRP_SALES__PRD__IF_OUT__READ")
            .unwrap();
        assert_eq!(role.interface, Some(id("out")));
    }

    #[test]
    fn test_unmanaged_names_rejected() {
        let n = naming();
        assert!(n.parse_database_role("DB.SYSADMIN").is_err());
        assert!(n.parse_database_role("DB.GRP_SALES__PRD__WRITE").is_err());
        assert!(n.parse_database_role("DB.GRP_SALES__PRD__OUT__READ").is_err());
        assert!(n.parse_database_role("GRP_SALES__PRD__READ").is_err());
        assert!(n.is_managed_account_role("GRP_MARKETING__PRD__READ"));
        assert!(!n.is_managed_account_role("ANALYST"));
        assert!(!n.is_managed_account_role("GRP_SALES__PRD__IF_OUT__READ"));
    }

    #[test]
    fn test_account_role() {
        let role = AccountRole {
            product: id("marketing"),
            dtap: id("dev"),
            mode: Mode::Read,
        };
        let name = naming().account_role_name(&role);
        assert_eq!(name, "grp_marketing__dev__read");
        assert_eq!(naming().parse_account_role(&name.to_uppercase()).unwrap(), role);
    }

    #[test]
    fn test_invalid_naming() {
        assert!(RoleNaming::new("", "if_").is_err());
        assert!(RoleNaming::new("grp__", "if_").is_err());
        assert!(RoleNaming::new("1grp", "if_").is_err());
        assert!(RoleNaming::new("grp_", "if-").is_err());
        assert!(RoleNaming::new("GRP_", "").is_ok());
    }
}
