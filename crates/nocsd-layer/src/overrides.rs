//! Exported replacements for the toolkit's public entry points.
//!
//! Every override delegates to the original. Policy is only applied while
//! the gate reports a patchable toolkit; otherwise the call passes through
//! untouched.

use std::ffi::{CStr, CString};

use libc::{c_char, c_int, c_ulong, c_void};
use nocsd_config::{log_intercept_debug, log_intercept_warn};
use nocsd_core::session::{self, CompositeDisableGuard};
use nocsd_core::{
    close_button_plan, strip_window_buttons_bytes, stripped_copy_plan, titlebar_plan, StrippedCopy,
    TitlebarPlan, WellKnownType,
};

use crate::class_init::{address_of, as_callback};
use crate::ffi::*;
use crate::gate;
use crate::header_bar;
use crate::imports::{self, real};
use crate::probe::{self, private_region, WindowLayout};
use crate::resolver::{Library, RealSymbol};
use crate::style;

const CUSTOM_TITLE_KEY: &CStr = c"custom_title";
const STRIPPED_LAYOUT_KEY: &CStr = c"nocsd-decoration-layout";
/// The toolkit layout the stored stripped copy was made from.
const STRIPPED_SOURCE_KEY: &CStr = c"nocsd-decoration-layout-source";
const DECORATION_LAYOUT_PROPERTY: &[u8] = b"gtk-decoration-layout";

unsafe fn set_custom_title(window: *mut GtkWindow) {
    imports::g_object_set_data(window.cast(), CUSTOM_TITLE_KEY.as_ptr(), 1usize as gpointer);
}

unsafe fn has_custom_title(window: *mut GtkWindow) -> bool {
    !imports::g_object_get_data(window.cast(), CUSTOM_TITLE_KEY.as_ptr()).is_null()
}

/// Stripped copy of `layout`, allocated with `g_strdup`. `None` when the
/// layout cannot be rewritten.
unsafe fn stripped_dup(layout: *const c_char) -> Option<*mut c_char> {
    if layout.is_null() {
        return None;
    }
    let stripped = strip_window_buttons_bytes(CStr::from_ptr(layout).to_bytes()).ok()?;
    let stripped = CString::new(stripped).ok()?;
    Some(imports::g_strdup(stripped.as_ptr()))
}

// --- title bar ---

#[no_mangle]
pub unsafe extern "C" fn gtk_window_set_titlebar(window: *mut GtkWindow, titlebar: *mut GtkWidget) {
    let plan = titlebar_plan(gate::active_band(), !titlebar.is_null(), || {
        title_box_slot(window)
    });
    match plan {
        TitlebarPlan::Delegate => real::gtk_window_set_titlebar(window, titlebar),
        TitlebarPlan::DirectAssign((layout, title_box)) => {
            assign_titlebar(window, titlebar, layout, title_box)
        }
        TitlebarPlan::CompositeHack => {
            let _composite = CompositeDisableGuard::enter();
            real::gtk_window_set_titlebar(window, titlebar);
            if !window.is_null() && !titlebar.is_null() {
                set_custom_title(window);
            }
        }
    }
}

/// Where `window` keeps its title bar, once the window layout is known.
unsafe fn title_box_slot(window: *mut GtkWindow) -> Option<(WindowLayout, *mut *mut GtkWidget)> {
    let layout = probe::window_layout()?;
    let (private, _) = private_region(window.cast(), WellKnownType::Window).ok()?;
    Some((layout, private.add(layout.title_box_offset).cast()))
}

/// Does what GTK's setter does, minus turning on client-side decorations.
unsafe fn assign_titlebar(
    window: *mut GtkWindow,
    titlebar: *mut GtkWidget,
    layout: WindowLayout,
    title_box: *mut *mut GtkWidget,
) {
    let widget: *mut GtkWidget = window.cast();

    let mut was_mapped = false;
    if title_box.read().is_null() {
        was_mapped = imports::gtk_widget_get_mapped(widget) != FALSE;
        if imports::gtk_widget_get_realized(widget) != FALSE {
            log_intercept_warn!("title bar set on a realized window");
            imports::gtk_widget_unrealize(widget);
        }
    }

    // Drops any previous title bar. GTK leaves "solid-csd" behind.
    real::gtk_window_set_titlebar(window, std::ptr::null_mut());
    imports::gtk_style_context_remove_class(
        imports::gtk_widget_get_style_context(widget),
        c"solid-csd".as_ptr(),
    );

    title_box.write(titlebar);
    imports::gtk_widget_set_parent(titlebar, widget);
    if imports::is_a(titlebar.cast(), imports::gtk_header_bar_get_type()) {
        let notify: TitleNotifyFn = layout.on_title_notify;
        real::g_signal_connect_data(
            titlebar.cast(),
            c"notify::title".as_ptr(),
            as_callback(notify),
            window.cast(),
            None,
            0,
        );
        notify(titlebar.cast(), std::ptr::null_mut(), window);
    }

    imports::gtk_style_context_add_class(
        imports::gtk_widget_get_style_context(titlebar),
        c"titlebar".as_ptr(),
    );
    style::attach_titlebar_css(titlebar);

    if was_mapped {
        imports::gtk_widget_map(widget);
    }
}

// --- header bar ---

#[no_mangle]
pub unsafe extern "C" fn gtk_header_bar_set_show_close_button(
    bar: *mut GtkHeaderBar,
    setting: gboolean,
) {
    let plan = close_button_plan(gate::active_band(), setting != FALSE);
    real::gtk_header_bar_set_show_close_button(bar, gboolean::from(plan.setting));
    if plan.fixup {
        header_bar::update_window_buttons(bar);
    }
}

#[no_mangle]
pub unsafe extern "C" fn gtk_header_bar_set_decoration_layout(
    bar: *mut GtkHeaderBar,
    layout: *const c_char,
) {
    // The original fills in the private fields the fixup then rewrites.
    real::gtk_header_bar_set_decoration_layout(bar, layout);
    if gate::active_band().is_some_and(|band| band.header_bar_fixups) {
        header_bar::update_window_buttons(bar);
    }
}

/// Callers see the layout without the buttons the window manager draws.
/// The returned string is owned by the header bar and stays valid until
/// the bar's layout changes.
#[no_mangle]
pub unsafe extern "C" fn gtk_header_bar_get_decoration_layout(bar: *mut GtkHeaderBar) -> *const c_char {
    let layout = real::gtk_header_bar_get_decoration_layout(bar);
    if layout.is_null() || bar.is_null() || !gate::patchable() {
        return layout;
    }

    let cached_source = imports::g_object_get_data(bar.cast(), STRIPPED_SOURCE_KEY.as_ptr());
    let cached_source = (!cached_source.is_null())
        .then(|| CStr::from_ptr(cached_source.cast::<c_char>()).to_bytes());
    match stripped_copy_plan(cached_source, CStr::from_ptr(layout).to_bytes()) {
        StrippedCopy::Reuse => {
            let cached = imports::g_object_get_data(bar.cast(), STRIPPED_LAYOUT_KEY.as_ptr());
            if cached.is_null() {
                layout
            } else {
                cached.cast()
            }
        }
        StrippedCopy::Replace(stripped) => {
            let Ok(stripped) = CString::new(stripped) else {
                return layout;
            };
            let copy = imports::g_strdup(stripped.as_ptr());
            if copy.is_null() {
                return layout;
            }
            // Source first, so a stored copy always has a matching source.
            imports::g_object_set_data_full(
                bar.cast(),
                STRIPPED_SOURCE_KEY.as_ptr(),
                imports::g_strdup(layout).cast(),
                Some(g_free_notify),
            );
            imports::g_object_set_data_full(
                bar.cast(),
                STRIPPED_LAYOUT_KEY.as_ptr(),
                copy.cast(),
                Some(g_free_notify),
            );
            copy
        }
        StrippedCopy::Passthrough => layout,
    }
}

unsafe extern "C" fn g_free_notify(data: gpointer) {
    imports::g_free(data);
}

// --- GDK ---

#[no_mangle]
pub unsafe extern "C" fn gdk_screen_is_composited(screen: *mut GdkScreen) -> gboolean {
    if session::composite_disabled() && gate::patchable() {
        return FALSE;
    }
    real::gdk_screen_is_composited(screen)
}

#[no_mangle]
pub unsafe extern "C" fn gdk_window_set_decorations(window: *mut GdkWindow, decorations: c_int) {
    let mut decorations = decorations;
    if decorations == GDK_DECOR_BORDER && gate::patchable() {
        let mut widget: gpointer = std::ptr::null_mut();
        imports::gdk_window_get_user_data(window, &mut widget);
        if imports::is_a(widget, imports::gtk_window_get_type()) && has_custom_title(widget.cast()) {
            decorations = GDK_DECOR_ALL;
        }
    }
    real::gdk_window_set_decorations(window, decorations);
}

// --- signals ---

/// Signal connections are only observed, never altered.
#[no_mangle]
pub unsafe extern "C" fn g_signal_connect_data(
    instance: gpointer,
    detailed_signal: *const c_char,
    c_handler: GCallback,
    data: gpointer,
    destroy_data: GClosureNotify,
    connect_flags: libc::c_uint,
) -> c_ulong {
    if !detailed_signal.is_null() {
        session::observe_connect(
            instance as usize,
            CStr::from_ptr(detailed_signal).to_bytes(),
            data as usize,
            address_of(c_handler),
        );
    }
    real::g_signal_connect_data(
        instance,
        detailed_signal,
        c_handler,
        data,
        destroy_data,
        connect_flags,
    )
}

// --- introspection ---

static ORIGINAL_SET_TITLEBAR: RealSymbol = RealSymbol::new(Library::Gtk, "gtk_window_set_titlebar\0");
static ORIGINAL_SET_SHOW_CLOSE_BUTTON: RealSymbol =
    RealSymbol::new(Library::Gtk, "gtk_header_bar_set_show_close_button\0");
static ORIGINAL_SET_DECORATION_LAYOUT: RealSymbol =
    RealSymbol::new(Library::Gtk, "gtk_header_bar_set_decoration_layout\0");

/// Bindings call through prepared invokers, which would skip our
/// overrides. Point those at the overrides instead.
#[no_mangle]
pub unsafe extern "C" fn g_function_info_prep_invoker(
    info: *mut GIFunctionInfo,
    invoker: *mut GIFunctionInvoker,
    error: *mut *mut GError,
) -> gboolean {
    let prepared = real::g_function_info_prep_invoker(info, invoker, error);
    if prepared == FALSE || invoker.is_null() {
        return prepared;
    }

    let native = (*invoker).native_address;
    if native.is_null() {
        return prepared;
    }
    let substitutes: [(&RealSymbol, gpointer); 3] = [
        (&ORIGINAL_SET_TITLEBAR, gtk_window_set_titlebar as gpointer),
        (
            &ORIGINAL_SET_SHOW_CLOSE_BUTTON,
            gtk_header_bar_set_show_close_button as gpointer,
        ),
        (
            &ORIGINAL_SET_DECORATION_LAYOUT,
            gtk_header_bar_set_decoration_layout as gpointer,
        ),
    ];
    for (original, ours) in substitutes {
        if original.get() == native {
            log_intercept_debug!("invoker redirected", symbol = original.name());
            (*invoker).native_address = ours;
            break;
        }
    }
    prepared
}

// --- g_object_get ---
//
// The exported symbol is a jump into a C function that owns the variadic
// argument list and calls back into the helpers below. The helpers have to
// be exported for the C side to link against them, so they carry a prefix
// no other library would use.

static OBJECT_GET_VALIST: RealSymbol = RealSymbol::new(Library::Gobject, "g_object_get_valist\0");

extern "C" {
    fn gtk3_nocsd_private_object_get_variadic(
        object: gpointer,
        first_property_name: *const c_char,
        ...
    );
}

#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn g_object_get(object: gpointer, first_property_name: *const c_char) {
    #[cfg(target_arch = "aarch64")]
    core::arch::naked_asm!("b {}", sym gtk3_nocsd_private_object_get_variadic);
    #[cfg(target_arch = "x86_64")]
    core::arch::naked_asm!("jmp {}", sym gtk3_nocsd_private_object_get_variadic);
}

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
compile_error!("the g_object_get trampoline is only written for x86_64 and aarch64");

#[no_mangle]
pub unsafe extern "C" fn gtk3_nocsd_private_is_object(object: gpointer) -> c_int {
    c_int::from(imports::is_object(object))
}

/// Whether the getter must walk the arguments itself.
#[no_mangle]
pub unsafe extern "C" fn gtk3_nocsd_private_object_get_override_active() -> c_int {
    c_int::from(session::layout_override_active())
}

#[no_mangle]
pub unsafe extern "C" fn gtk3_nocsd_private_object_get_valist_real() -> *mut c_void {
    OBJECT_GET_VALIST.get()
}

/// Reads one property into `dest`. Nonzero stops the argument walk.
#[no_mangle]
pub unsafe extern "C" fn gtk3_nocsd_private_object_get_one(
    object: gpointer,
    name: *const c_char,
    dest: gpointer,
) -> c_int {
    if name.is_null() {
        return 1;
    }
    let spec = imports::g_object_class_find_property(imports::object_class(object), name);
    if spec.is_null() {
        log_intercept_warn!(
            "object has no such property",
            property = tracing::field::debug(CStr::from_ptr(name))
        );
        return 1;
    }

    let mut value = GValue::zeroed();
    imports::g_value_init(&mut value, (*spec).value_type);
    imports::g_object_get_property(object, name, &mut value);

    let stop = if CStr::from_ptr(name).to_bytes() == DECORATION_LAYOUT_PROPERTY {
        let layout = imports::g_value_get_string(&value);
        let copy = stripped_dup(layout).unwrap_or_else(|| imports::g_strdup(layout));
        dest.cast::<*mut c_char>().write(copy);
        0
    } else {
        lcopy(&value, dest)
    };

    imports::g_value_unset(&mut value);
    stop
}

/// `G_VALUE_LCOPY` for a single pointer-collected location.
unsafe fn lcopy(value: &GValue, dest: gpointer) -> c_int {
    let table = imports::g_type_value_table_peek(value.g_type);
    if table.is_null() {
        return 1;
    }
    let Some(lcopy_value) = (*table).lcopy_value else {
        return 1;
    };
    let format = (*table).lcopy_format;
    if format.is_null() || CStr::from_ptr(format).to_bytes() != b"p" {
        log_intercept_warn!("unsupported value collection format");
        return 1;
    }

    let mut collected = GTypeCValue { v_pointer: dest };
    let error = lcopy_value(value, 1, &mut collected, 0);
    if error.is_null() {
        return 0;
    }
    log_intercept_warn!(
        "g_object_get_valist",
        error = tracing::field::debug(CStr::from_ptr(error))
    );
    imports::g_free(error.cast());
    1
}
