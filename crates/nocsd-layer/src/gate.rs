//! Process-wide patch decision, wired to `gtk_check_version`.

use libc::{c_char, c_uint};
use nocsd_config::logging::init_for;
use nocsd_config::{log_gate_info, BandPolicy, Config, ToolkitVersion};
use nocsd_core::{is_patchable, CapabilityGate, VersionCheck};

use crate::resolver::{Library, RealSymbol};

pub static GATE: CapabilityGate = CapabilityGate::new();

static CHECK_VERSION: RealSymbol = RealSymbol::new(Library::Gtk, "gtk_check_version\0");

type CheckVersionFn = unsafe extern "C" fn(c_uint, c_uint, c_uint) -> *const c_char;

/// Configuration, installing our log subscriber on first use. Problems
/// found while loading the configuration are reported right after.
pub fn settings() -> &'static Config {
    let config = nocsd_config::config();
    init_for(config);
    config
}

/// `None` while the toolkit is not loaded.
fn toolkit_at_least(version: ToolkitVersion) -> Option<bool> {
    let f = unsafe { CHECK_VERSION.get() };
    if f.is_null() {
        return None;
    }
    let check: CheckVersionFn = unsafe { std::mem::transmute(f) };
    // NULL means the running toolkit is compatible with the request.
    Some(unsafe { check(version.major, version.minor, version.micro) }.is_null())
}

fn check_version(config: &Config) -> VersionCheck {
    let Some(minimum) = config.policy.minimum() else {
        return VersionCheck::Loaded(None);
    };
    if toolkit_at_least(minimum).is_none() {
        return VersionCheck::NotLoaded;
    }
    let band = config
        .policy
        .select(|version| toolkit_at_least(version).unwrap_or(false));
    if let Some(policy) = band.and_then(|i| config.policy.band(i)) {
        log_gate_info!("toolkit supported", band = tracing::field::display(policy.min));
    }
    VersionCheck::Loaded(band)
}

/// The policy band to apply, or `None` when every override should just
/// delegate (toolkit too old or absent, legacy toolkit in use, user opted
/// out).
pub fn active_band() -> Option<&'static BandPolicy> {
    let config = settings();
    let band = GATE.band(|| check_version(config));
    if !is_patchable(band.is_some(), config.patch_enabled) {
        return None;
    }
    band.and_then(|i| config.policy.band(i))
}

pub fn patchable() -> bool {
    active_band().is_some()
}
