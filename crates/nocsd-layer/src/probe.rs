//! The two private-layout probes.
//!
//! Each builds a throwaway window and header bar, runs the toolkit's own
//! setter on them while the connect interceptor captures the internal
//! callback it installs, then scans the private region for the pointer the
//! setter stored.

use libc::c_void;
use nocsd_core::probe::{contains_pointer, find_unique_pointer};
use nocsd_core::session::{CaptureGuard, CaptureTarget};
use nocsd_core::{throwaway_release, ProbeCell, ProbeError, WellKnownType};

use crate::class_init::REGISTRY;
use crate::ffi::*;
use crate::gate;
use crate::imports::{self, real};

#[derive(Clone, Copy)]
pub struct WindowLayout {
    /// Offset of `title_box` in the window's private data.
    pub title_box_offset: usize,
    pub on_title_notify: TitleNotifyFn,
}

#[derive(Clone, Copy)]
pub struct HeaderBarLayout {
    /// Offset of `decoration_layout` in the header bar's private data.
    pub decoration_layout_offset: usize,
    pub update_window_buttons: UpdateButtonsFn,
    /// Older toolkits do not connect one.
    pub window_state_changed: Option<WindowStateFn>,
}

static WINDOW: ProbeCell<WindowLayout> = ProbeCell::new("GtkWindow title box");
static HEADER_BAR: ProbeCell<HeaderBarLayout> = ProbeCell::new("GtkHeaderBar decoration layout");

pub fn window_layout() -> Option<WindowLayout> {
    WINDOW.get_or_probe(|| unsafe { probe_window() })
}

pub fn header_bar_layout() -> Option<HeaderBarLayout> {
    HEADER_BAR.get_or_probe(|| {
        let band = gate::active_band().ok_or(ProbeError::NotApplicable)?;
        if !band.header_bar_fixups {
            return Err(ProbeError::NotApplicable);
        }
        unsafe { probe_header_bar() }
    })
}

/// A window with a header bar, destroyed on drop.
struct Throwaway {
    window: *mut GtkWidget,
    bar: *mut GtkWidget,
    /// Set once the bar is the window's title bar.
    attached: bool,
}

impl Throwaway {
    unsafe fn new() -> Result<Self, ProbeError> {
        let objects = Throwaway {
            window: imports::gtk_window_new(GTK_WINDOW_TOPLEVEL),
            bar: imports::gtk_header_bar_new(),
            attached: false,
        };
        if objects.window.is_null() {
            return Err(ProbeError::ObjectCreation("GtkWindow"));
        }
        if objects.bar.is_null() {
            return Err(ProbeError::ObjectCreation("GtkHeaderBar"));
        }
        Ok(objects)
    }

    fn window(&self) -> *mut GtkWindow {
        self.window.cast()
    }

    fn bar(&self) -> *mut GtkHeaderBar {
        self.bar.cast()
    }

    unsafe fn attach(&mut self) {
        real::gtk_window_set_titlebar(self.window(), self.bar);
        self.attached = true;
    }
}

impl Drop for Throwaway {
    fn drop(&mut self) {
        let release =
            throwaway_release(!self.window.is_null(), !self.bar.is_null(), self.attached);
        unsafe {
            if release.container {
                imports::gtk_widget_destroy(self.window);
            }
            if release.detached_child {
                // Still floating: take ownership so destroying it frees it.
                imports::g_object_ref_sink(self.bar.cast());
                imports::gtk_widget_destroy(self.bar);
                imports::g_object_unref(self.bar.cast());
            }
        }
    }
}

/// Private data of `instance` and its recorded size.
pub unsafe fn private_region(
    instance: *mut c_void,
    kind: WellKnownType,
) -> Result<(*mut u8, usize), ProbeError> {
    let size = REGISTRY
        .private_size(kind)
        .ok_or(ProbeError::PrivateRegionUnknown)?;
    let type_id = REGISTRY
        .type_id(kind)
        .ok_or(ProbeError::PrivateRegionUnknown)?;
    let private = imports::g_type_instance_get_private(instance.cast(), type_id);
    if private.is_null() {
        return Err(ProbeError::SanityCheck("instance has no private data"));
    }
    Ok((private.cast(), size))
}

/// Snapshot view of a private region. Only held while nothing writes it.
unsafe fn region<'a>((start, len): (*mut u8, usize)) -> &'a [u8] {
    std::slice::from_raw_parts(start, len)
}

fn capture(
    signal: &'static str,
    instance: *mut c_void,
    data: *mut c_void,
) -> Result<CaptureGuard, ProbeError> {
    CaptureGuard::arm(CaptureTarget {
        signal,
        instance: instance as usize,
        data: data as usize,
    })
    .ok_or(ProbeError::SanityCheck("signal capture unavailable"))
}

unsafe fn probe_window() -> Result<WindowLayout, ProbeError> {
    // Checked before anything is created so a deferred probe costs nothing.
    REGISTRY
        .private_size(WellKnownType::Window)
        .ok_or(ProbeError::PrivateRegionUnknown)?;

    let mut objects = Throwaway::new()?;
    let private = private_region(objects.window.cast(), WellKnownType::Window)?;
    if contains_pointer(region(private), objects.bar as usize) {
        return Err(ProbeError::AlreadyPresent);
    }

    let title_notify = capture("notify::title", objects.bar.cast(), std::ptr::null_mut())?;
    objects.attach();
    let callback = title_notify.finish();

    let offset = find_unique_pointer(region(private), objects.bar as usize)?;
    let callback = callback.ok_or(ProbeError::CallbackMissing("notify::title"))?;

    Ok(WindowLayout {
        title_box_offset: offset,
        on_title_notify: std::mem::transmute::<usize, TitleNotifyFn>(callback),
    })
}

unsafe fn probe_header_bar() -> Result<HeaderBarLayout, ProbeError> {
    REGISTRY
        .private_size(WellKnownType::HeaderBar)
        .ok_or(ProbeError::PrivateRegionUnknown)?;

    let mut objects = Throwaway::new()?;

    // Realizing needs a toplevel, and attaching is when the window-state
    // handler gets connected.
    let window_state = capture("window-state-event", objects.window.cast(), std::ptr::null_mut())?;
    objects.attach();
    let window_state = window_state.finish();

    let private = private_region(objects.bar.cast(), WellKnownType::HeaderBar)?;

    // The setter stores a copy, so ask the getter for the stored pointer.
    real::gtk_header_bar_set_decoration_layout(objects.bar(), c"menu:close".as_ptr());
    let stored = real::gtk_header_bar_get_decoration_layout(objects.bar());
    let offset = find_unique_pointer(region(private), stored as usize)?;

    real::gtk_header_bar_set_decoration_layout(objects.bar(), std::ptr::null());
    let slot = private.0.add(offset).cast::<*const libc::c_char>();
    if !slot.read().is_null() {
        return Err(ProbeError::SanityCheck("decoration layout slot not cleared"));
    }

    let layout_notify = capture(
        "notify::gtk-decoration-layout",
        std::ptr::null_mut(),
        objects.bar.cast(),
    )?;
    imports::gtk_widget_realize(objects.bar);
    let update = layout_notify
        .finish()
        .ok_or(ProbeError::CallbackMissing("notify::gtk-decoration-layout"))?;

    Ok(HeaderBarLayout {
        decoration_layout_offset: offset,
        update_window_buttons: std::mem::transmute::<usize, UpdateButtonsFn>(update),
        window_state_changed: window_state
            .map(|f| std::mem::transmute::<usize, WindowStateFn>(f)),
    })
}
