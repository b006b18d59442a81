//! Integration tests for nocsd-core
//!
//! Exercise the engine the way the preload layer drives it: the gate fed by
//! the configured policy table, guarded counters around delegated calls,
//! probes that run once, and layout rewriting end to end.

use std::cell::Cell;
use std::mem::size_of;
use std::sync::{Arc, Barrier};
use std::thread;

use nocsd_config::{patch_enabled_for, PolicyTable, ToolkitVersion};
use nocsd_core::session::{composite_disable_depth, layout_override_active};
use nocsd_core::{
    button_update_plan, close_button_plan, find_unique_pointer, is_patchable, stripped_copy_plan,
    strip_window_buttons, throwaway_release, titlebar_plan, ButtonUpdate, CapabilityGate,
    CloseButtonPlan, CompositeDisableGuard, LayoutError, LayoutOverrideGuard, ProbeCell,
    ProbeError, ProbeState, StrippedCopy, ThrowawayRelease, TitlebarPlan, VersionCheck,
};

fn v(s: &str) -> ToolkitVersion {
    s.parse().unwrap()
}

fn decide(table: &PolicyTable, version: &str, csd: Option<&str>) -> bool {
    let gate = CapabilityGate::new();
    let compatible = gate.compatible(|| VersionCheck::Loaded(table.select_for(v(version))));
    is_patchable(compatible, patch_enabled_for(csd))
}

/// Patching applies iff the version reaches the first band and GTK_CSD is not "1"
#[test]
fn test_gate_truth_table_over_versions() {
    let table = PolicyTable::builtin();
    let min = table.minimum().unwrap();
    assert_eq!(min, v("3.10.0"));

    for version in ["3.8.9", "3.9.99", "3.10.0", "3.12.0", "3.16.1", "3.24.41"] {
        let new_enough = v(version) >= min;
        for csd in [None, Some("0"), Some(""), Some("yes"), Some("1")] {
            let expected = new_enough && csd != Some("1");
            assert_eq!(
                decide(&table, version, csd),
                expected,
                "version {version}, GTK_CSD {csd:?}"
            );
        }
    }
}

/// A gate asked before the toolkit loads must answer again later
#[test]
fn test_gate_late_loading_toolkit() {
    let table = PolicyTable::builtin();
    let gate = CapabilityGate::new();
    assert!(!gate.compatible(|| VersionCheck::NotLoaded));
    assert!(!gate.compatible(|| VersionCheck::NotLoaded));
    assert_eq!(
        gate.band(|| VersionCheck::Loaded(table.select_for(v("3.18.9")))),
        Some(2)
    );
}

fn delegated_call(fail: bool) -> Result<u32, ProbeError> {
    let _guard = CompositeDisableGuard::enter();
    assert_eq!(composite_disable_depth(), 1);
    if fail {
        return Err(ProbeError::SanityCheck("delegate failed"));
    }
    let inner = {
        let _nested = CompositeDisableGuard::enter();
        composite_disable_depth()
    };
    Ok(inner)
}

fn calls_through_question_mark() -> Result<u32, ProbeError> {
    let _guard = CompositeDisableGuard::enter();
    delegated_call(true)?;
    Ok(0)
}

/// The composite-disable counter is balanced on every exit path
#[test]
fn test_counter_balanced_on_error_paths() {
    assert_eq!(delegated_call(false), Ok(2));
    assert_eq!(composite_disable_depth(), 0);

    assert!(delegated_call(true).is_err());
    assert_eq!(composite_disable_depth(), 0);

    assert!(calls_through_question_mark().is_err());
    assert_eq!(composite_disable_depth(), 0);

    {
        let _layout = LayoutOverrideGuard::enter();
        assert!(delegated_call(true).is_err());
        assert!(layout_override_active());
    }
    assert!(!layout_override_active());
}

/// Two threads never see each other's counters
#[test]
fn test_counters_are_per_thread() {
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [1u32, 3]
        .into_iter()
        .map(|depth| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let guards: Vec<_> = (0..depth).map(|_| CompositeDisableGuard::enter()).collect();
                barrier.wait();
                let seen = composite_disable_depth();
                barrier.wait();
                drop(guards);
                (seen, composite_disable_depth())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![(1, 0), (3, 0)]);
    assert_eq!(composite_disable_depth(), 0);
}

fn private_region(slots: &[usize]) -> Vec<u8> {
    slots.iter().flat_map(|s| s.to_ne_bytes()).collect()
}

/// Probing twice returns the cached offset without rerunning the protocol
#[test]
fn test_probe_is_idempotent() {
    static TITLE_BOX: ProbeCell<usize> = ProbeCell::new("GtkWindow title box");
    let runs = Cell::new(0);
    let bar = 0x7f00_1234_5670usize;
    let region = private_region(&[0, 0x10, 0, bar, 0x20]);

    let probe = || {
        runs.set(runs.get() + 1);
        find_unique_pointer(&region, bar)
    };
    let first = TITLE_BOX.get_or_probe(probe);
    let second = TITLE_BOX.get_or_probe(|| {
        runs.set(runs.get() + 1);
        Ok(0)
    });

    assert_eq!(first, Some(3 * size_of::<usize>()));
    assert_eq!(second, first);
    assert_eq!(runs.get(), 1);
}

/// Scenario C: pointer absent, dependent feature falls back
#[test]
fn test_probe_zero_matches_falls_back() {
    let cell: ProbeCell<usize> = ProbeCell::new("zero");
    let region = private_region(&[1, 2, 3]);
    assert_eq!(cell.get_or_probe(|| find_unique_pointer(&region, 0xfeed)), None);
    assert_eq!(cell.peek(), ProbeState::Failed);

    // what an override does with the answer
    let used_fallback = cell.get_or_probe(|| Ok(8)).is_none();
    assert!(used_fallback);
}

/// Scenario D: pointer present twice, failure is permanent
#[test]
fn test_probe_ambiguous_never_retried() {
    let cell: ProbeCell<usize> = ProbeCell::new("ambiguous");
    let region = private_region(&[0xbeef, 0, 0xbeef]);
    let runs = Cell::new(0);

    for _ in 0..3 {
        let got = cell.get_or_probe(|| {
            runs.set(runs.get() + 1);
            find_unique_pointer(&region, 0xbeef)
        });
        assert_eq!(got, None);
    }
    assert_eq!(runs.get(), 1);
    assert_eq!(cell.peek(), ProbeState::Failed);
    assert_eq!(
        find_unique_pointer(&region, 0xbeef),
        Err(ProbeError::Ambiguous { matches: 2 })
    );
}

/// Two threads asking for the same probe run it once between them
#[test]
fn test_concurrent_first_use_probes_once() {
    static CELL: ProbeCell<usize> = ProbeCell::new("concurrent");
    static RUNS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                CELL.get_or_probe(|| {
                    RUNS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(20));
                    Ok(48)
                })
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), Some(48));
    }
    assert_eq!(RUNS.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_layout_scenarios() {
    // scenario A
    assert_eq!(
        strip_window_buttons("menu:minimize,maximize,close").unwrap(),
        "menu:"
    );
    // scenario B
    assert_eq!(strip_window_buttons("close,minimize:").unwrap(), ":");
}

#[test]
fn test_layout_round_trip_and_idempotence() {
    let cases = [
        ("icon,menu:minimize,maximize,close", "menu:"),
        ("appmenu,close:spacer,help", "appmenu:spacer,help"),
        ("a,b,c:d,e", "a,b,c:d,e"),
        ("icon:icon", ":"),
        ("menu", "menu"),
    ];
    for (input, expected) in cases {
        let once = strip_window_buttons(input).unwrap();
        assert_eq!(once, expected, "input {input:?}");
        assert_eq!(strip_window_buttons(&once).unwrap(), once);
    }
}

#[test]
fn test_layout_length_limit() {
    let long = format!("menu:{}", ",close".repeat(60));
    assert!(long.len() > 255);
    assert!(matches!(
        strip_window_buttons(&long),
        Err(LayoutError::TooLong { max: 255, .. })
    ));
}

// === override decisions ===

fn band_for(table: &PolicyTable, version: &str) -> Option<nocsd_config::BandPolicy> {
    table
        .select_for(v(version))
        .and_then(|i| table.band(i))
        .cloned()
}

/// Direct assignment needs a new-enough band, a title bar and a known layout
#[test]
fn test_titlebar_plan_across_bands() {
    let table = PolicyTable::builtin();
    let layout_known = || Some(0x28usize);
    let layout_unknown = || None::<usize>;

    assert_eq!(
        titlebar_plan(band_for(&table, "3.8.0").as_ref(), true, layout_known),
        TitlebarPlan::Delegate
    );
    assert_eq!(
        titlebar_plan(band_for(&table, "3.14.5").as_ref(), true, layout_known),
        TitlebarPlan::CompositeHack
    );
    assert_eq!(
        titlebar_plan(band_for(&table, "3.24.41").as_ref(), true, layout_known),
        TitlebarPlan::DirectAssign(0x28)
    );
    // A missing window layout falls back to the hack, never guesses
    assert_eq!(
        titlebar_plan(band_for(&table, "3.24.41").as_ref(), true, layout_unknown),
        TitlebarPlan::CompositeHack
    );
}

#[test]
fn test_close_button_plan_across_bands() {
    let table = PolicyTable::builtin();

    let oldest = close_button_plan(band_for(&table, "3.10.4").as_ref(), true);
    assert_eq!(oldest, CloseButtonPlan { setting: false, fixup: false });

    let newer = close_button_plan(band_for(&table, "3.18.0").as_ref(), true);
    assert_eq!(newer, CloseButtonPlan { setting: true, fixup: true });

    let unpatched = close_button_plan(None, true);
    assert_eq!(unpatched, CloseButtonPlan { setting: true, fixup: false });
}

#[test]
fn test_button_update_plan() {
    assert_eq!(button_update_plan(None), ButtonUpdate::OverrideGlobal);
    assert_eq!(
        button_update_plan(Some(b"icon,menu:minimize,maximize,close")),
        ButtonUpdate::SwapLayout(b"menu:".to_vec())
    );
    assert_eq!(
        button_update_plan(Some(b"menu:")),
        ButtonUpdate::SwapLayout(b"menu:".to_vec())
    );
}

/// Stands in for a header bar's object data: the layout a copy was made
/// from and the copy itself, freed when replaced.
#[derive(Default)]
struct BarData {
    source: Option<Vec<u8>>,
    copy: Option<Box<[u8]>>,
}

impl BarData {
    fn get_layout(&mut self, current: &[u8]) -> *const u8 {
        match stripped_copy_plan(self.source.as_deref(), current) {
            StrippedCopy::Reuse => self.copy.as_ref().map_or(current.as_ptr(), |c| c.as_ptr()),
            StrippedCopy::Replace(stripped) => {
                self.source = Some(current.to_vec());
                self.copy = Some(stripped.into_boxed_slice());
                self.copy.as_ref().map_or(current.as_ptr(), |c| c.as_ptr())
            }
            StrippedCopy::Passthrough => current.as_ptr(),
        }
    }
}

/// Reading the layout twice must hand out the same string, so a caller
/// holding the first result never sees it freed
#[test]
fn test_repeated_layout_reads_return_same_copy() {
    let mut bar = BarData::default();
    let first = bar.get_layout(b"menu:minimize,close");
    let second = bar.get_layout(b"menu:minimize,close");
    assert_eq!(first, second);
    assert_eq!(bar.copy.as_deref(), Some(&b"menu:"[..]));

    // A changed layout is the only thing that replaces the copy
    bar.get_layout(b"close:appmenu");
    assert_eq!(bar.copy.as_deref(), Some(&b":appmenu"[..]));
    assert_eq!(bar.source.as_deref(), Some(&b"close:appmenu"[..]));
    assert_eq!(
        stripped_copy_plan(bar.source.as_deref(), b"close:appmenu"),
        StrippedCopy::Reuse
    );
}

#[test]
fn test_unrewritable_layout_passes_through() {
    let long = vec![b'x'; 300];
    assert_eq!(stripped_copy_plan(None, &long), StrippedCopy::Passthrough);
    let mut bar = BarData::default();
    assert_eq!(bar.get_layout(&long), long.as_ptr());
    assert!(bar.copy.is_none());
}

/// A title bar that never got attached is released by itself
#[test]
fn test_unattached_child_is_released() {
    assert_eq!(
        throwaway_release(true, true, false),
        ThrowawayRelease {
            container: true,
            detached_child: true
        }
    );
    assert_eq!(
        throwaway_release(true, true, true),
        ThrowawayRelease {
            container: true,
            detached_child: false
        }
    );
}
