//! Locating the original implementations behind the symbols this library
//! interposes.
//!
//! `dlsym(RTLD_NEXT)` covers a normal preload. When the toolkit was brought
//! in by a `dlopen`ed module, `RTLD_NEXT` cannot see it, so the library is
//! reopened by soname with `RTLD_NOLOAD` (never loading a fresh copy) and
//! the symbol is looked up in that handle. Those handles are taken once per
//! library and closed from the process destructor.

use libc::{c_char, c_int, c_void, dl_phdr_info, size_t};
use nocsd_config::{log_gate_info, log_resolver_debug};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;

use crate::gate::GATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    Gtk,
    Gdk,
    Gobject,
    Glib,
    Girepository,
}

const LIBRARY_COUNT: usize = 5;

/// Soname of the legacy GDK that shares two entry points with ours.
const LEGACY_GDK_SONAME: &str = "libgdk-x11-2.0.so.0\0";

impl Library {
    fn soname(self) -> &'static str {
        match self {
            Library::Gtk => "libgtk-3.so.0\0",
            Library::Gdk => "libgdk-3.so.0\0",
            Library::Gobject => "libgobject-2.0.so.0\0",
            Library::Glib => "libglib-2.0.so.0\0",
            Library::Girepository => "libgirepository-1.0.so.1\0",
        }
    }

    /// Same library from the legacy toolkit, for the few entry points that
    /// exist there with a compatible signature.
    fn legacy_soname(self) -> Option<&'static str> {
        match self {
            Library::Gdk => Some(LEGACY_GDK_SONAME),
            _ => None,
        }
    }

    fn slot(self, legacy: bool) -> usize {
        self as usize + if legacy { LIBRARY_COUNT } else { 0 }
    }
}

struct HandleSlot {
    handle: AtomicPtr<c_void>,
    lock: Mutex<()>,
}

impl HandleSlot {
    const fn new() -> Self {
        Self {
            handle: AtomicPtr::new(std::ptr::null_mut()),
            lock: Mutex::new(()),
        }
    }
}

/// Current libraries first, legacy ones after.
static HANDLES: [HandleSlot; LIBRARY_COUNT * 2] = [
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
    HandleSlot::new(),
];

/// Handle of an already resident library, taking our reference once.
unsafe fn resident_handle(library: Library, legacy: bool) -> *mut c_void {
    let soname = if legacy {
        match library.legacy_soname() {
            Some(s) => s,
            None => return std::ptr::null_mut(),
        }
    } else {
        library.soname()
    };
    let slot = &HANDLES[library.slot(legacy)];

    let handle = slot.handle.load(Ordering::Acquire);
    if !handle.is_null() {
        return handle;
    }

    let _lock = slot.lock.lock().unwrap_or_else(|e| e.into_inner());
    // Another thread may have won while we waited.
    let handle = slot.handle.load(Ordering::Acquire);
    if !handle.is_null() {
        return handle;
    }
    let handle = libc::dlopen(
        soname.as_ptr() as *const c_char,
        libc::RTLD_LAZY | libc::RTLD_NOLOAD,
    );
    if handle.is_null() {
        log_resolver_debug!(
            "library not resident",
            soname = soname.trim_end_matches('\0')
        );
    } else {
        slot.handle.store(handle, Ordering::Release);
    }
    handle
}

unsafe fn lookup_in(library: Library, legacy: bool, symbol: &'static str) -> *mut c_void {
    let handle = resident_handle(library, legacy);
    if handle.is_null() {
        return std::ptr::null_mut();
    }
    libc::dlsym(handle, symbol.as_ptr() as *const c_char)
}

/// Original implementation of `symbol` (NUL terminated), or null.
///
/// `legacy_capable` marks the entry points that also exist in the legacy
/// toolkit. Once the legacy toolkit is known to be the active one those are
/// taken from it directly, since `RTLD_NEXT` could pick either copy.
pub unsafe fn find_original(
    library: Library,
    symbol: &'static str,
    legacy_capable: bool,
) -> *mut c_void {
    if legacy_capable && GATE.legacy_active() {
        return lookup_in(library, true, symbol);
    }

    let next = libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr() as *const c_char);
    if !next.is_null() {
        return next;
    }

    let found = lookup_in(library, false, symbol);
    if !found.is_null() || !legacy_capable {
        if found.is_null() {
            log_resolver_debug!("symbol unavailable", symbol = symbol.trim_end_matches('\0'));
        }
        return found;
    }
    lookup_in(library, true, symbol)
}

/// Drop every handle taken by [`find_original`]. Runs once at unload.
pub unsafe fn release_handles() {
    for slot in HANDLES.iter() {
        let handle = slot.handle.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if !handle.is_null() {
            libc::dlclose(handle);
        }
    }
}

/// Lazily resolved original of one interposed or imported function.
pub struct RealSymbol {
    ptr: AtomicPtr<c_void>,
    library: Library,
    name: &'static str,
    legacy_capable: bool,
}

impl RealSymbol {
    pub const fn new(library: Library, name: &'static str) -> Self {
        Self {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            library,
            name,
            legacy_capable: false,
        }
    }

    /// For entry points present with the same signature in the legacy GDK.
    pub const fn legacy_capable(library: Library, name: &'static str) -> Self {
        Self {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            library,
            name,
            legacy_capable: true,
        }
    }

    /// Resolved address, or null when no implementation is reachable.
    /// A miss is not cached so a late-loading library is picked up.
    pub unsafe fn get(&self) -> *mut c_void {
        let p = self.ptr.load(Ordering::Acquire);
        if !p.is_null() {
            return p;
        }
        let f = find_original(self.library, self.name, self.legacy_capable);
        if !f.is_null() {
            self.ptr.store(f, Ordering::Release);
        }
        f
    }

    pub fn name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }
}

const LEGACY_GDK_NAME: &[u8] = b"libgdk-x11-2.0.so.0";

unsafe extern "C" fn check_legacy_segment(
    info: *mut dl_phdr_info,
    _size: size_t,
    data: *mut c_void,
) -> c_int {
    let info = &*info;
    if info.dlpi_name.is_null() {
        return 0;
    }
    let name = std::ffi::CStr::from_ptr(info.dlpi_name).to_bytes();
    if !name
        .windows(LEGACY_GDK_NAME.len())
        .any(|w| w == LEGACY_GDK_NAME)
    {
        return 0;
    }

    let address = data as usize;
    let headers = std::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize);
    for header in headers {
        let start = (info.dlpi_addr as usize).wrapping_add(header.p_vaddr as usize);
        let end = start.wrapping_add(header.p_memsz as usize);
        if (start..end).contains(&address) {
            if GATE.mark_legacy() {
                log_gate_info!("legacy toolkit in use, patching disabled");
            }
            return 1;
        }
    }
    0
}

/// Latch the legacy flag if `address` (a registration callback) lives in the
/// legacy GDK's mapped segments. Programs with plugins can have both
/// toolkits loaded; only the owner of the code actually running matters.
pub fn detect_legacy(address: usize) {
    if address == 0 || GATE.legacy_active() {
        return;
    }
    unsafe {
        libc::dl_iterate_phdr(Some(check_legacy_segment), address as *mut c_void);
    }
}
