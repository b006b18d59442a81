//! Structured logging utilities for nocsd components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use nocsd_config::logging::*;
//!
//! log_probe_warn!("private layout not found", type_name = "GtkWindow");
//! log_gate_debug!("toolkit version checked", band = 2);
//! ```

use once_cell::sync::OnceCell;

use crate::Config;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const GATE: &'static str = "GATE";
    pub const RESOLVER: &'static str = "RESOLVER";
    pub const PROBE: &'static str = "PROBE";
    pub const INTERCEPT: &'static str = "INTERCEPT";
    pub const CONFIG: &'static str = "CONFIG";
}

// === GATE logging macros ===

#[macro_export]
macro_rules! log_gate_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::GATE, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_gate_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::GATE, $($key = $value,)* $msg)
    };
}

// === RESOLVER logging macros ===

#[macro_export]
macro_rules! log_resolver_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::RESOLVER, $($key = $value,)* $msg)
    };
}

// === PROBE logging macros ===

#[macro_export]
macro_rules! log_probe_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::PROBE, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_probe_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::PROBE, $($key = $value,)* $msg)
    };
}

// === INTERCEPT logging macros ===

#[macro_export]
macro_rules! log_intercept_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::INTERCEPT, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_intercept_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::INTERCEPT, $($key = $value,)* $msg)
    };
}

// === CONFIG logging macros ===

#[macro_export]
macro_rules! log_config_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::CONFIG, $($key = $value,)* $msg)
    };
}

static INSTALLED: OnceCell<bool> = OnceCell::new();
static CONFIG_REPORTED: OnceCell<()> = OnceCell::new();

/// Install logging as `config` asks, then report what loading the config
/// could not log itself. The report is made once per process, whether or
/// not our subscriber is the one installed.
pub fn init_for(config: &Config) -> bool {
    let installed = init_logging(&config.log_filter);
    CONFIG_REPORTED.get_or_init(|| {
        if let Some(warning) = config.policy_warning() {
            crate::log_config_warn!(
                "policy file rejected, using built-in bands",
                reason = tracing::field::display(&warning)
            );
        }
    });
    installed
}

/// Install a stderr subscriber filtered by `filter` (an `EnvFilter`
/// directive). Runs at most once; a subscriber the host process already
/// installed is left in place. Returns whether ours is active.
pub fn init_logging(filter: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        use tracing_subscriber::EnvFilter;

        let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::GATE, "GATE");
        assert_eq!(Component::PROBE, "PROBE");
        assert_eq!(Component::INTERCEPT, "INTERCEPT");
    }

    #[test]
    fn test_init_for_reports_without_panicking() {
        let config = Config {
            policy_path: Some("/nonexistent/policy.toml".into()),
            policy_error: Some(std::sync::Arc::new(crate::ConfigError::InvalidPolicy(
                "no bands".into(),
            ))),
            ..Config::default()
        };
        let first = init_for(&config);
        assert_eq!(init_for(&Config::default()), first);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let first = init_logging("debug");
        assert_eq!(init_logging("error"), first);
    }
}
