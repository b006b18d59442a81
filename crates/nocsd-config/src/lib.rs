//! # nocsd-config
//!
//! Configuration for the nocsd preload layer.
//!
//! Read once from the environment:
//! 1. `GTK_CSD` - `1` opts out of patching, anything else (or unset) keeps it on
//! 2. `GTK3_NOCSD_LOG` - tracing filter directive, default `warn`
//! 3. `GTK3_NOCSD_POLICY` - optional TOML file replacing the built-in version bands

use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;

pub mod logging;
pub mod policy;

pub use policy::{BandPolicy, CloseButtonStrategy, PolicyTable, TitlebarStrategy, ToolkitVersion};

pub const CSD_ENV: &str = "GTK_CSD";
/// The only `GTK_CSD` value that disables patching.
pub const CSD_OPT_OUT: &str = "1";
pub const LOG_ENV: &str = "GTK3_NOCSD_LOG";
pub const POLICY_ENV: &str = "GTK3_NOCSD_POLICY";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Global config instance
static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

/// Get global config (read-only)
pub fn config() -> &'static Config {
    &CONFIG
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether the user left patching on.
    pub patch_enabled: bool,
    pub log_filter: String,
    pub policy: PolicyTable,
    /// Policy file that was requested, if any.
    pub policy_path: Option<PathBuf>,
    /// Why the requested policy file was not used. Reported once logging
    /// is up, see [`logging::init_for`].
    pub policy_error: Option<Arc<ConfigError>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patch_enabled: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            policy: PolicyTable::builtin(),
            policy_path: None,
            policy_error: None,
        }
    }
}

impl Config {
    /// Load config from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config {
            patch_enabled: patch_enabled_for(lookup(CSD_ENV).as_deref()),
            ..Config::default()
        };

        if let Some(filter) = lookup(LOG_ENV).filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        if let Some(path) = lookup(POLICY_ENV).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(path);
            // Loading happens before any subscriber exists, so the error
            // is kept for the caller instead of logged here.
            match PolicyTable::load(&path) {
                Ok(table) => config.policy = table,
                Err(e) => config.policy_error = Some(Arc::new(e)),
            }
            config.policy_path = Some(path);
        }

        config
    }

    /// Warning line for a policy file that was rejected.
    pub fn policy_warning(&self) -> Option<String> {
        let error = self.policy_error.as_ref()?;
        let path = self
            .policy_path
            .as_ref()
            .map_or_else(|| "<unset>".into(), |p| p.display().to_string());
        Some(format!("ignoring policy file {path}: {error}"))
    }

    /// The band a toolkit version falls into, if any.
    pub fn band_for(&self, version: ToolkitVersion) -> Option<&BandPolicy> {
        self.policy
            .select_for(version)
            .and_then(|i| self.policy.band(i))
    }
}

/// `GTK_CSD` semantics: only the exact opt-out value disables patching.
pub fn patch_enabled_for(value: Option<&str>) -> bool {
    value != Some(CSD_OPT_OUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_opt_out_value() {
        assert!(patch_enabled_for(None));
        assert!(patch_enabled_for(Some("0")));
        assert!(patch_enabled_for(Some("")));
        assert!(patch_enabled_for(Some("1 ")));
        assert!(!patch_enabled_for(Some("1")));
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert!(config.patch_enabled);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.policy, PolicyTable::builtin());
        assert!(config.policy_path.is_none());
        assert!(config.policy_error.is_none());
        assert!(config.policy_warning().is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (CSD_ENV, "1"),
            (LOG_ENV, "nocsd=debug"),
        ]));
        assert!(!config.patch_enabled);
        assert_eq!(config.log_filter, "nocsd=debug");
    }

    #[test]
    fn test_missing_policy_file_keeps_builtin() {
        let config = Config::from_lookup(lookup_from(&[(
            POLICY_ENV,
            "/nonexistent/nocsd-policy.toml",
        )]));
        assert_eq!(config.policy, PolicyTable::builtin());
        assert!(config.policy_path.is_some());
        assert!(matches!(
            config.policy_error.as_deref(),
            Some(ConfigError::Io(_))
        ));
        let warning = config.policy_warning().unwrap();
        assert!(warning.starts_with("ignoring policy file /nonexistent/nocsd-policy.toml: IO error"));
    }
}
