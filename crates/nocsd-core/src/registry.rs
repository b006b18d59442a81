//! Type identity table and patch-once bookkeeping for the class-init
//! interceptor.
//!
//! Everything here is stored as plain addresses and numeric type ids, so the
//! table works without knowing anything about the toolkit's structures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Types whose registration is intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    Window,
    Dialog,
    HeaderBar,
    ShortcutsWindow,
}

impl WellKnownType {
    pub const ALL: [WellKnownType; 4] = [
        WellKnownType::Window,
        WellKnownType::Dialog,
        WellKnownType::HeaderBar,
        WellKnownType::ShortcutsWindow,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            WellKnownType::Window => "GtkWindow",
            WellKnownType::Dialog => "GtkDialog",
            WellKnownType::HeaderBar => "GtkHeaderBar",
            WellKnownType::ShortcutsWindow => "GtkShortcutsWindow",
        }
    }

    /// Match a registration name (without terminator).
    pub fn from_type_name(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.type_name().as_bytes() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

struct TypeSlot {
    captured: AtomicBool,
    original_init: AtomicUsize,
    type_id: AtomicUsize,
    private_size: AtomicUsize,
}

impl TypeSlot {
    const fn new() -> Self {
        Self {
            captured: AtomicBool::new(false),
            original_init: AtomicUsize::new(0),
            type_id: AtomicUsize::new(0),
            private_size: AtomicUsize::new(0),
        }
    }
}

/// Process-wide record of the intercepted registrations.
pub struct TypeRegistry {
    slots: [TypeSlot; 4],
}

impl TypeRegistry {
    pub const fn new() -> Self {
        Self {
            slots: [
                TypeSlot::new(),
                TypeSlot::new(),
                TypeSlot::new(),
                TypeSlot::new(),
            ],
        }
    }

    fn slot(&self, kind: WellKnownType) -> &TypeSlot {
        &self.slots[kind.index()]
    }

    /// Claim the initializer of `kind` for substitution.
    ///
    /// Returns `true` only for the first registration seen for `kind`; the
    /// caller then swaps in its wrapper. Later registrations (another type
    /// reusing the name, a second toolkit copy) pass through untouched.
    pub fn capture_init(&self, kind: WellKnownType, init: usize) -> bool {
        if init == 0 {
            return false;
        }
        let slot = self.slot(kind);
        if slot
            .captured
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        slot.original_init.store(init, Ordering::Release);
        true
    }

    /// Initializer the wrapper should delegate to.
    pub fn original_init(&self, kind: WellKnownType) -> Option<usize> {
        match self.slot(kind).original_init.load(Ordering::Acquire) {
            0 => None,
            init => Some(init),
        }
    }

    /// Record the id the registration returned. Only the first id sticks.
    pub fn record_type_id(&self, kind: WellKnownType, type_id: usize) {
        if type_id == 0 {
            return;
        }
        let _ = self.slot(kind).type_id.compare_exchange(
            0,
            type_id,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn type_id(&self, kind: WellKnownType) -> Option<usize> {
        match self.slot(kind).type_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Which well-known type a runtime id belongs to.
    pub fn lookup(&self, type_id: usize) -> Option<WellKnownType> {
        if type_id == 0 {
            return None;
        }
        WellKnownType::ALL
            .into_iter()
            .find(|k| self.slot(*k).type_id.load(Ordering::Acquire) == type_id)
    }

    /// Note the private-data size added to `type_id`, if it is one of ours.
    /// Returns the type it was recorded for.
    pub fn record_private_size(&self, type_id: usize, size: usize) -> Option<WellKnownType> {
        let kind = self.lookup(type_id)?;
        if size == 0 {
            return None;
        }
        self.slot(kind)
            .private_size
            .compare_exchange(0, size, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| kind)
    }

    pub fn private_size(&self, kind: WellKnownType) -> Option<usize> {
        match self.slot(kind).private_size.load(Ordering::Acquire) {
            0 => None,
            size => Some(size),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Previous value of one overwritten class-table slot.
///
/// Saved the first time a class of the owning type is patched and never
/// replaced, so a subclass that inherited the wrapper cannot make the
/// wrapper delegate to itself.
pub struct OriginalSlot {
    ptr: AtomicUsize,
}

impl OriginalSlot {
    pub const fn new() -> Self {
        Self {
            ptr: AtomicUsize::new(0),
        }
    }

    /// Save `previous` unless something is already saved. Returns whether
    /// this call stored it.
    pub fn save_once(&self, previous: usize) -> bool {
        previous != 0
            && self
                .ptr
                .compare_exchange(0, previous, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    pub fn get(&self) -> Option<usize> {
        match self.ptr.load(Ordering::Acquire) {
            0 => None,
            p => Some(p),
        }
    }
}

impl Default for OriginalSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup() {
        assert_eq!(
            WellKnownType::from_type_name(b"GtkHeaderBar"),
            Some(WellKnownType::HeaderBar)
        );
        assert_eq!(WellKnownType::from_type_name(b"GtkWindowGroup"), None);
        assert_eq!(WellKnownType::from_type_name(b"GtkWindow\0"), None);
        for kind in WellKnownType::ALL {
            assert_eq!(
                WellKnownType::from_type_name(kind.type_name().as_bytes()),
                Some(kind)
            );
        }
    }

    #[test]
    fn test_capture_init_only_once() {
        let registry = TypeRegistry::new();
        assert!(!registry.capture_init(WellKnownType::Window, 0));
        assert!(registry.capture_init(WellKnownType::Window, 0x1000));
        assert!(!registry.capture_init(WellKnownType::Window, 0x2000));
        assert_eq!(registry.original_init(WellKnownType::Window), Some(0x1000));
        assert_eq!(registry.original_init(WellKnownType::Dialog), None);
    }

    #[test]
    fn test_type_ids() {
        let registry = TypeRegistry::new();
        registry.record_type_id(WellKnownType::Dialog, 0x55);
        registry.record_type_id(WellKnownType::Dialog, 0x66);
        assert_eq!(registry.type_id(WellKnownType::Dialog), Some(0x55));
        assert_eq!(registry.lookup(0x55), Some(WellKnownType::Dialog));
        assert_eq!(registry.lookup(0x66), None);
        assert_eq!(registry.lookup(0), None);
    }

    #[test]
    fn test_private_size_first_only() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.record_private_size(0x77, 64), None);

        registry.record_type_id(WellKnownType::HeaderBar, 0x77);
        assert_eq!(
            registry.record_private_size(0x77, 64),
            Some(WellKnownType::HeaderBar)
        );
        assert_eq!(registry.record_private_size(0x77, 128), None);
        assert_eq!(registry.private_size(WellKnownType::HeaderBar), Some(64));
        assert_eq!(registry.private_size(WellKnownType::Window), None);
    }

    #[test]
    fn test_original_slot_saved_once() {
        let slot = OriginalSlot::new();
        assert_eq!(slot.get(), None);
        assert!(!slot.save_once(0));
        assert!(slot.save_once(0xabc));
        assert!(!slot.save_once(0xdef));
        assert_eq!(slot.get(), Some(0xabc));
    }
}
