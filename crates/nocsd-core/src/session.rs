//! Per-thread session state shared by cooperating interceptors.
//!
//! Every counter is moved only through a guard so enter/exit stay paired on
//! every return path. The record lives in a `thread_local!` and is released
//! with its thread.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a connect interceptor should watch for while a probe runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTarget {
    /// Detailed signal name, e.g. `notify::title`.
    pub signal: &'static str,
    /// Match connections made on this instance (0 = any).
    pub instance: usize,
    /// Match connections carrying this user data (0 = any).
    pub data: usize,
}

impl CaptureTarget {
    fn matches(&self, instance: usize, signal: &[u8], data: usize) -> bool {
        if signal != self.signal.as_bytes() {
            return false;
        }
        (instance != 0 && instance == self.instance) || (data != 0 && data == self.data)
    }
}

pub struct Session {
    composite_disable: Cell<u32>,
    layout_override: Cell<u32>,
    in_probe: Cell<bool>,
    capture: Cell<Option<CaptureTarget>>,
    captured: Cell<usize>,
}

impl Session {
    const fn new() -> Self {
        Self {
            composite_disable: Cell::new(0),
            layout_override: Cell::new(0),
            in_probe: Cell::new(false),
            capture: Cell::new(None),
            captured: Cell::new(0),
        }
    }
}

thread_local! {
    static SESSION: Session = const { Session::new() };
}

/// Number of capture sessions armed across all threads. Lets the connect
/// interceptor skip the thread-local lookup on the common path.
static CAPTURES_ARMED: AtomicUsize = AtomicUsize::new(0);

/// Run `f` against this thread's record. Returns `None` once the thread is
/// tearing down its locals.
fn with_session<R>(f: impl FnOnce(&Session) -> R) -> Option<R> {
    SESSION.try_with(f).ok()
}

/// Current composite-disable nesting depth on this thread.
pub fn composite_disable_depth() -> u32 {
    with_session(|s| s.composite_disable.get()).unwrap_or(0)
}

/// Whether compositing should currently be reported as unavailable.
pub fn composite_disabled() -> bool {
    composite_disable_depth() > 0
}

/// Whether the generic property getter should rewrite the global
/// decoration layout on this thread.
pub fn layout_override_active() -> bool {
    with_session(|s| s.layout_override.get() > 0).unwrap_or(false)
}

/// Whether this thread is inside a structure-layout probe.
pub fn in_probe() -> bool {
    with_session(|s| s.in_probe.get()).unwrap_or(false)
}

/// Keeps the composite-disable counter raised for its lifetime.
#[must_use = "the counter drops back as soon as the guard is dropped"]
pub struct CompositeDisableGuard {
    _not_send: PhantomData<*const ()>,
}

impl CompositeDisableGuard {
    pub fn enter() -> Self {
        with_session(|s| s.composite_disable.set(s.composite_disable.get().saturating_add(1)));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for CompositeDisableGuard {
    fn drop(&mut self) {
        with_session(|s| s.composite_disable.set(s.composite_disable.get().saturating_sub(1)));
    }
}

/// Keeps the decoration layout override active for its lifetime.
#[must_use = "the override ends as soon as the guard is dropped"]
pub struct LayoutOverrideGuard {
    _not_send: PhantomData<*const ()>,
}

impl LayoutOverrideGuard {
    pub fn enter() -> Self {
        with_session(|s| s.layout_override.set(s.layout_override.get().saturating_add(1)));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for LayoutOverrideGuard {
    fn drop(&mut self) {
        with_session(|s| s.layout_override.set(s.layout_override.get().saturating_sub(1)));
    }
}

/// Marks the thread as probing. Not reentrant: a nested `enter` yields `None`.
#[must_use]
pub struct ProbeGuard {
    _not_send: PhantomData<*const ()>,
}

impl ProbeGuard {
    pub fn enter() -> Option<Self> {
        let entered = with_session(|s| !s.in_probe.replace(true)).unwrap_or(false);
        entered.then_some(Self {
            _not_send: PhantomData,
        })
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        with_session(|s| s.in_probe.set(false));
    }
}

/// An armed signal-capture session. Disarms on drop.
#[must_use]
pub struct CaptureGuard {
    _not_send: PhantomData<*const ()>,
}

impl CaptureGuard {
    /// Arm capture for `target`, clearing any earlier result. Only valid
    /// inside a probe; returns `None` otherwise.
    pub fn arm(target: CaptureTarget) -> Option<Self> {
        let armed = with_session(|s| {
            if !s.in_probe.get() || s.capture.get().is_some() {
                return false;
            }
            s.captured.set(0);
            s.capture.set(Some(target));
            true
        })
        .unwrap_or(false);
        if !armed {
            return None;
        }
        CAPTURES_ARMED.fetch_add(1, Ordering::AcqRel);
        Some(Self {
            _not_send: PhantomData,
        })
    }

    /// Disarm and return the captured callback address, if any.
    pub fn finish(self) -> Option<usize> {
        let captured = with_session(|s| s.captured.get()).unwrap_or(0);
        drop(self);
        (captured != 0).then_some(captured)
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        with_session(|s| s.capture.set(None));
        CAPTURES_ARMED.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Called by the connect interceptor for every signal connection.
///
/// Records `callback` when it matches this thread's armed capture. Never
/// invokes anything. Returns whether the callback was recorded.
pub fn observe_connect(instance: usize, signal: &[u8], data: usize, callback: usize) -> bool {
    if CAPTURES_ARMED.load(Ordering::Acquire) == 0 {
        return false;
    }
    with_session(|s| match s.capture.get() {
        Some(target) if s.in_probe.get() && target.matches(instance, signal, data) => {
            s.captured.set(callback);
            true
        }
        _ => false,
    })
    .unwrap_or(false)
}
