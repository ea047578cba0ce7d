//! Runtime configuration
//!
//! Read from `GRUPIN_*` environment variables. [`Config::from_lookup`] takes
//! any key lookup so tests never touch the process environment.

use crate::error::{GrupinError, Result};
use crate::grants::RoleNaming;
use std::time::Duration;

pub const ROLE_PREFIX_VAR: &str = "GRUPIN_ROLE_PREFIX";
pub const INTERFACE_INFIX_VAR: &str = "GRUPIN_INTERFACE_INFIX";
pub const BATCH_SIZE_VAR: &str = "GRUPIN_BATCH_SIZE";
pub const MAX_ATTEMPTS_VAR: &str = "GRUPIN_MAX_ATTEMPTS";
pub const RETRY_BASE_DELAY_VAR: &str = "GRUPIN_RETRY_BASE_DELAY_MS";
pub const WORKERS_VAR: &str = "GRUPIN_WORKERS";
pub const USAGE_TABLE_VAR: &str = "GRUPIN_USAGE_TABLE";

/// Reconciler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub naming: RoleNaming,
    /// Statements per round trip
    pub batch_size: usize,
    /// Attempts per unit before giving up on drift
    pub max_attempts: u32,
    /// First retry delay; doubled on every further attempt
    pub retry_base_delay: Duration,
    pub workers: usize,
    /// Reporting table for usage records; `None` disables them
    pub usage_table: Option<String>,
}

impl Config {
    pub const DEFAULT_INTERFACE_INFIX: &'static str = "if_";
    pub const DEFAULT_BATCH_SIZE: usize = 100;
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 250;
    pub const DEFAULT_WORKERS: usize = 4;

    /// Defaults for everything but the required role prefix.
    pub fn new(naming: RoleNaming) -> Self {
        Config {
            naming,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(Self::DEFAULT_RETRY_BASE_DELAY_MS),
            workers: Self::DEFAULT_WORKERS,
            usage_table: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name).and_then(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };

        let prefix = get(ROLE_PREFIX_VAR)
            .ok_or_else(|| GrupinError::Config(format!("{} is required", ROLE_PREFIX_VAR)))?;
        let infix =
            get(INTERFACE_INFIX_VAR).unwrap_or_else(|| Self::DEFAULT_INTERFACE_INFIX.to_string());
        let mut config = Config::new(RoleNaming::new(prefix, infix)?);

        if let Some(n) = parse_number::<usize>(BATCH_SIZE_VAR, get(BATCH_SIZE_VAR))? {
            config.batch_size = n;
        }
        if let Some(n) = parse_number::<u32>(MAX_ATTEMPTS_VAR, get(MAX_ATTEMPTS_VAR))? {
            config.max_attempts = n;
        }
        if let Some(ms) = parse_number::<u64>(RETRY_BASE_DELAY_VAR, get(RETRY_BASE_DELAY_VAR))? {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_number::<usize>(WORKERS_VAR, get(WORKERS_VAR))? {
            config.workers = n;
        }
        config.usage_table = get(USAGE_TABLE_VAR);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GrupinError::Config(format!("{} must be at least 1", BATCH_SIZE_VAR)));
        }
        if self.max_attempts == 0 {
            return Err(GrupinError::Config(format!("{} must be at least 1", MAX_ATTEMPTS_VAR)));
        }
        if self.workers == 0 {
            return Err(GrupinError::Config(format!("{} must be at least 1", WORKERS_VAR)));
        }
        Ok(())
    }

    /// Delay before attempt `attempt + 1`, after `attempt` failures.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay.saturating_mul(factor)
    }
}

fn parse_number<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(v) = value else {
        return Ok(None);
    };
    v.parse::<T>()
        .map(Some)
        .map_err(|e| GrupinError::Config(format!("{} must be a number: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[(ROLE_PREFIX_VAR, "grp_")])).unwrap();
        assert_eq!(config.naming.prefix(), "grp_");
        assert_eq!(config.naming.interface_infix(), "if_");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.workers, 4);
        assert_eq!(config.usage_table, None);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ROLE_PREFIX_VAR, "GRP_"),
            (INTERFACE_INFIX_VAR, "i_"),
            (BATCH_SIZE_VAR, " 10 "),
            (MAX_ATTEMPTS_VAR, "2"),
            (RETRY_BASE_DELAY_VAR, "0"),
            (WORKERS_VAR, "1"),
            (USAGE_TABLE_VAR, "ADMIN.GRUPIN.USAGE"),
        ]))
        .unwrap();
        assert_eq!(config.naming.prefix(), "grp_");
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.retry_base_delay, Duration::ZERO);
        assert_eq!(config.usage_table.as_deref(), Some("ADMIN.GRUPIN.USAGE"));
    }

    #[test]
    fn test_errors() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, GrupinError::Config(_)));

        let err = Config::from_lookup(lookup(&[(ROLE_PREFIX_VAR, "   ")])).unwrap_err();
        assert!(matches!(err, GrupinError::Config(_)));

        for (var, value) in [
            (BATCH_SIZE_VAR, "0"),
            (BATCH_SIZE_VAR, "ten"),
            (MAX_ATTEMPTS_VAR, "0"),
            (WORKERS_VAR, "-1"),
            (INTERFACE_INFIX_VAR, "if__"),
        ] {
            let err = Config::from_lookup(lookup(&[(ROLE_PREFIX_VAR, "grp_"), (var, value)]))
                .unwrap_err();
            assert!(matches!(err, GrupinError::Config(_)), "{}={}", var, value);
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let mut config = Config::new(RoleNaming::new("grp_", "if_").unwrap());
        config.retry_base_delay = Duration::from_millis(100);
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        // The factor is capped instead of overflowing
        assert_eq!(config.backoff(40), Duration::from_millis(100) * u32::MAX);
    }
}
