//! Probe-once, cache-forever storage for discovered private layouts, and the
//! pointer-slot scanner the probes rely on.

use std::mem::size_of;
use std::sync::{Mutex, MutexGuard, TryLockError};

use nocsd_config::{log_probe_debug, log_probe_warn};

use crate::error::ProbeError;
use crate::session::{self, ProbeGuard};

/// Cached outcome of a structure-layout probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState<T> {
    NotProbed,
    Probed(T),
    /// The running toolkit has no such field.
    NotApplicable,
    /// Probing ran and could not establish a unique, valid answer.
    Failed,
}

impl<T: Copy> ProbeState<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            ProbeState::Probed(v) => Some(*v),
            _ => None,
        }
    }
}

/// Process-wide cell holding one probe result.
///
/// The probe runs under the cell's mutex so two threads never probe the
/// same type concurrently; the second waits and reads the result.
pub struct ProbeCell<T> {
    name: &'static str,
    state: Mutex<ProbeState<T>>,
}

impl<T: Copy> ProbeCell<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(ProbeState::NotProbed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state without probing or blocking.
    pub fn peek(&self) -> ProbeState<T> {
        match self.state.try_lock() {
            Ok(state) => *state,
            Err(TryLockError::Poisoned(e)) => *e.into_inner(),
            Err(TryLockError::WouldBlock) => ProbeState::NotProbed,
        }
    }

    /// Cached value, probing first if this is the first request.
    ///
    /// Any error except [`ProbeError::is_deferred`] is cached permanently and
    /// never retried. Calls made from inside a probe on the same thread see
    /// the state as it was before the probe started.
    pub fn get_or_probe(&self, probe: impl FnOnce() -> Result<T, ProbeError>) -> Option<T> {
        if session::in_probe() {
            return self.peek().value();
        }

        let mut state = self.lock();
        if !matches!(*state, ProbeState::NotProbed) {
            return state.value();
        }

        let Some(_probing) = ProbeGuard::enter() else {
            return None;
        };
        match probe() {
            Ok(value) => {
                log_probe_debug!("private layout discovered", probe = self.name);
                *state = ProbeState::Probed(value);
                Some(value)
            }
            Err(e) if e.is_deferred() => None,
            Err(ProbeError::NotApplicable) => {
                *state = ProbeState::NotApplicable;
                None
            }
            Err(e) => {
                log_probe_warn!(
                    "could not determine runtime data structure layout, using fallback",
                    probe = self.name,
                    error = tracing::field::display(&e),
                );
                *state = ProbeState::Failed;
                None
            }
        }
    }
}

/// Offset of the single pointer-sized, pointer-aligned slot in `region`
/// holding `needle`.
///
/// `region` must start on a pointer boundary. Zero matches and more than one
/// match are both errors; nothing is guessed.
pub fn find_unique_pointer(region: &[u8], needle: usize) -> Result<usize, ProbeError> {
    if needle == 0 {
        return Err(ProbeError::SanityCheck("null needle"));
    }
    let mut found = None;
    let mut matches = 0;
    for (slot, chunk) in region.chunks_exact(size_of::<usize>()).enumerate() {
        let mut bytes = [0u8; size_of::<usize>()];
        bytes.copy_from_slice(chunk);
        if usize::from_ne_bytes(bytes) == needle {
            matches += 1;
            found.get_or_insert(slot * size_of::<usize>());
        }
    }
    match (matches, found) {
        (1, Some(offset)) => Ok(offset),
        (0, _) => Err(ProbeError::NotFound),
        (n, _) => Err(ProbeError::Ambiguous { matches: n }),
    }
}

/// Whether `needle` occurs in any slot of `region`.
pub fn contains_pointer(region: &[u8], needle: usize) -> bool {
    !matches!(
        find_unique_pointer(region, needle),
        Err(ProbeError::NotFound) | Err(ProbeError::SanityCheck(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn region_with(slots: &[usize]) -> Vec<u8> {
        slots.iter().flat_map(|s| s.to_ne_bytes()).collect()
    }

    #[test]
    fn test_unique_slot() {
        let region = region_with(&[1, 2, 0xdead_beef, 4]);
        assert_eq!(
            find_unique_pointer(&region, 0xdead_beef),
            Ok(2 * size_of::<usize>())
        );
    }

    #[test]
    fn test_zero_and_multiple_matches() {
        let region = region_with(&[7, 0xabc, 9, 0xabc]);
        assert_eq!(find_unique_pointer(&region, 0x123), Err(ProbeError::NotFound));
        assert_eq!(
            find_unique_pointer(&region, 0xabc),
            Err(ProbeError::Ambiguous { matches: 2 })
        );
    }

    #[test]
    fn test_unaligned_copies_are_ignored() {
        let mut region = region_with(&[0, 0, 0]);
        let needle: usize = 0x1122_3344;
        region[3..3 + size_of::<usize>()].copy_from_slice(&needle.to_ne_bytes());
        assert_eq!(find_unique_pointer(&region, needle), Err(ProbeError::NotFound));
    }

    #[test]
    fn test_trailing_partial_slot_is_not_read() {
        let mut region = region_with(&[5]);
        region.extend_from_slice(&[0xff; 3]);
        assert_eq!(find_unique_pointer(&region, 5), Ok(0));
    }

    #[test]
    fn test_probe_runs_once_on_success() {
        let cell: ProbeCell<usize> = ProbeCell::new("test");
        let runs = Cell::new(0);
        let probe = || {
            runs.set(runs.get() + 1);
            Ok(24)
        };
        assert_eq!(cell.get_or_probe(probe), Some(24));
        assert_eq!(cell.get_or_probe(|| unreachable!()), Some(24));
        assert_eq!(runs.get(), 1);
        assert_eq!(cell.peek(), ProbeState::Probed(24));
    }

    #[test]
    fn test_failure_is_permanent() {
        let cell: ProbeCell<usize> = ProbeCell::new("test");
        assert_eq!(
            cell.get_or_probe(|| Err(ProbeError::Ambiguous { matches: 2 })),
            None
        );
        assert_eq!(cell.peek(), ProbeState::Failed);
        assert_eq!(cell.get_or_probe(|| Ok(8)), None);
    }

    #[test]
    fn test_not_applicable_is_permanent() {
        let cell: ProbeCell<usize> = ProbeCell::new("test");
        assert_eq!(cell.get_or_probe(|| Err(ProbeError::NotApplicable)), None);
        assert_eq!(cell.peek(), ProbeState::NotApplicable);
        assert_eq!(cell.get_or_probe(|| Ok(8)), None);
    }

    #[test]
    fn test_deferred_probe_retries() {
        let cell: ProbeCell<usize> = ProbeCell::new("test");
        assert_eq!(
            cell.get_or_probe(|| Err(ProbeError::PrivateRegionUnknown)),
            None
        );
        assert_eq!(cell.peek(), ProbeState::NotProbed);
        assert_eq!(cell.get_or_probe(|| Ok(16)), Some(16));
    }

    #[test]
    fn test_nested_request_does_not_deadlock() {
        let cell: ProbeCell<usize> = ProbeCell::new("test");
        let nested = Cell::new(Some(1));
        let got = cell.get_or_probe(|| {
            assert!(session::in_probe());
            nested.set(cell.get_or_probe(|| unreachable!()));
            Ok(40)
        });
        assert_eq!(got, Some(40));
        assert_eq!(nested.get(), None);
        assert!(!session::in_probe());
    }
}
