//! Once-per-process decision whether patching applies.
//!
//! The answer is latched only after the toolkit was confirmed loaded. A
//! check that runs while the toolkit is still absent (a generic runtime
//! loaded this library first) is answered "no" for now and asked again on
//! the next call.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use nocsd_config::log_gate_debug;

const UNKNOWN: usize = 0;
const INCOMPATIBLE: usize = 1;
/// Compatible states store `BAND_BASE + band index`.
const BAND_BASE: usize = 2;

/// Result of asking the toolkit about its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// The version routine could not be reached.
    NotLoaded,
    /// The toolkit answered; `Some(band)` when a policy band matched.
    Loaded(Option<usize>),
}

/// Latched compatibility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    Unknown,
    Incompatible,
    Compatible { band: usize },
}

pub struct CapabilityGate {
    state: AtomicUsize,
    legacy: AtomicBool,
}

impl CapabilityGate {
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(UNKNOWN),
            legacy: AtomicBool::new(false),
        }
    }

    pub fn compatibility(&self) -> Compatibility {
        match self.state.load(Ordering::Acquire) {
            UNKNOWN => Compatibility::Unknown,
            INCOMPATIBLE => Compatibility::Incompatible,
            n => Compatibility::Compatible {
                band: n - BAND_BASE,
            },
        }
    }

    /// Selected band, running `check` if nothing is latched yet.
    ///
    /// Concurrent first calls may both run `check`; the answer is
    /// deterministic so whichever store lands last is equivalent.
    pub fn band(&self, check: impl FnOnce() -> VersionCheck) -> Option<usize> {
        if self.legacy.load(Ordering::Acquire) {
            return None;
        }
        match self.compatibility() {
            Compatibility::Compatible { band } => return Some(band),
            Compatibility::Incompatible => return None,
            Compatibility::Unknown => {}
        }
        match check() {
            VersionCheck::NotLoaded => None,
            VersionCheck::Loaded(band) => {
                let encoded = band.map_or(INCOMPATIBLE, |b| b + BAND_BASE);
                self.state.store(encoded, Ordering::Release);
                log_gate_debug!(
                    "toolkit compatibility latched",
                    band = tracing::field::debug(band)
                );
                // A legacy toolkit may have been detected while checking.
                if self.legacy.load(Ordering::Acquire) {
                    None
                } else {
                    band
                }
            }
        }
    }

    pub fn compatible(&self, check: impl FnOnce() -> VersionCheck) -> bool {
        self.band(check).is_some()
    }

    /// The legacy toolkit is the one in use. Overrides any latched answer.
    /// Returns `true` the first time.
    pub fn mark_legacy(&self) -> bool {
        !self.legacy.swap(true, Ordering::AcqRel)
    }

    pub fn legacy_active(&self) -> bool {
        self.legacy.load(Ordering::Acquire)
    }
}

impl Default for CapabilityGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Patching applies when the toolkit is compatible and the user has not
/// opted out.
pub fn is_patchable(compatible: bool, patch_enabled: bool) -> bool {
    compatible && patch_enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_not_latched_before_toolkit_loads() {
        let gate = CapabilityGate::new();
        let calls = Cell::new(0);

        assert_eq!(
            gate.band(|| {
                calls.set(calls.get() + 1);
                VersionCheck::NotLoaded
            }),
            None
        );
        assert_eq!(gate.compatibility(), Compatibility::Unknown);

        assert_eq!(
            gate.band(|| {
                calls.set(calls.get() + 1);
                VersionCheck::Loaded(Some(2))
            }),
            Some(2)
        );
        assert_eq!(calls.get(), 2);
        assert_eq!(gate.compatibility(), Compatibility::Compatible { band: 2 });
    }

    #[test]
    fn test_latched_answer_is_reused() {
        let gate = CapabilityGate::new();
        assert_eq!(gate.band(|| VersionCheck::Loaded(None)), None);
        assert_eq!(gate.compatibility(), Compatibility::Incompatible);
        // never asked again
        assert_eq!(gate.band(|| unreachable!()), None);
    }

    #[test]
    fn test_band_zero_is_compatible() {
        let gate = CapabilityGate::new();
        assert!(gate.compatible(|| VersionCheck::Loaded(Some(0))));
        assert!(gate.compatible(|| unreachable!()));
    }

    #[test]
    fn test_legacy_overrides_latched_state() {
        let gate = CapabilityGate::new();
        assert!(gate.compatible(|| VersionCheck::Loaded(Some(1))));
        assert!(gate.mark_legacy());
        assert!(!gate.mark_legacy());
        assert!(!gate.compatible(|| unreachable!()));
        assert!(gate.legacy_active());
    }

    #[test]
    fn test_patchable_truth_table() {
        assert!(is_patchable(true, true));
        assert!(!is_patchable(true, false));
        assert!(!is_patchable(false, true));
        assert!(!is_patchable(false, false));
    }
}
