//! Header-bar button fixups.
//!
//! GTK rebuilds the window buttons from the decoration layout in a private
//! routine. We run that routine ourselves with the layout temporarily
//! stripped of the buttons the window manager now draws.

use std::ffi::{CStr, CString};

use nocsd_config::log_intercept_debug;
use nocsd_core::{button_update_plan, ButtonUpdate, LayoutOverrideGuard, WellKnownType};

use crate::ffi::*;
use crate::gate;
use crate::probe::{self, private_region};

/// Replacement for GTK's `_gtk_header_bar_update_window_buttons`.
///
/// Connected swapped, so the header bar arrives as the first argument.
pub unsafe extern "C" fn update_window_buttons(bar: *mut GtkHeaderBar) {
    if bar.is_null() {
        return;
    }
    let Some(layout) = probe::header_bar_layout() else {
        return;
    };
    if !gate::patchable() {
        (layout.update_window_buttons)(bar);
        return;
    }
    let Ok((private, _)) = private_region(bar.cast(), WellKnownType::HeaderBar) else {
        return;
    };

    let slot = private
        .add(layout.decoration_layout_offset)
        .cast::<*const libc::c_char>();
    let original = slot.read();
    let own_layout = (!original.is_null()).then(|| CStr::from_ptr(original).to_bytes());
    let stripped = match button_update_plan(own_layout) {
        ButtonUpdate::SwapLayout(bytes) => CString::new(bytes).ok(),
        ButtonUpdate::OverrideGlobal => {
            // GTK reads the global setting, which the property getter
            // rewrites while this guard is held.
            let _override = LayoutOverrideGuard::enter();
            (layout.update_window_buttons)(bar);
            return;
        }
        ButtonUpdate::Plain => None,
    };

    match stripped {
        Some(stripped) => {
            slot.write(stripped.as_ptr());
            (layout.update_window_buttons)(bar);
            slot.write(original);
        }
        None => {
            log_intercept_debug!("decoration layout left as is");
            (layout.update_window_buttons)(bar);
        }
    }
}

/// Replacement for GTK's header-bar `window-state-event` handler.
pub unsafe extern "C" fn window_state_changed(
    widget: *mut GtkWidget,
    event: *mut GdkEventWindowState,
    data: gpointer,
) -> gboolean {
    let Some(layout) = probe::header_bar_layout() else {
        return FALSE;
    };
    let Some(original) = layout.window_state_changed else {
        return FALSE;
    };

    // Still run GTK's handler in case it grows more duties.
    let handled = original(widget, event, data);
    if !gate::patchable() || event.is_null() {
        return handled;
    }

    let watched = GDK_WINDOW_STATE_FULLSCREEN | GDK_WINDOW_STATE_MAXIMIZED | GDK_WINDOW_STATE_TILED;
    if (*event).changed_mask & watched != 0 {
        update_window_buttons(data.cast());
    }
    handled
}
