//! Every toolkit function the layer calls, imported at runtime.
//!
//! The layer is not linked against the toolkit: a program built with
//! immediate binding that never loads GTK must still start with the layer
//! preloaded. Each import resolves on first call and degrades to a fixed
//! value when the symbol is unreachable.

use libc::{c_char, c_int, c_uint, c_ulong};

use crate::ffi::*;
use crate::resolver::{Library, RealSymbol};

macro_rules! runtime_import {
    (@symbol $lib:ident, $name:ident) => {
        RealSymbol::new(Library::$lib, concat!(stringify!($name), "\0"))
    };
    (@symbol $lib:ident legacy, $name:ident) => {
        RealSymbol::legacy_capable(Library::$lib, concat!(stringify!($name), "\0"))
    };
    ($(
        $lib:ident $($legacy:ident)?: fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)? = $fallback:expr;
    )*) => {
        $(
            #[allow(clippy::unused_unit)]
            pub unsafe fn $name($($arg: $ty),*) $(-> $ret)? {
                static REAL: RealSymbol = runtime_import!(@symbol $lib $($legacy)?, $name);
                let p = REAL.get();
                if p.is_null() {
                    return $fallback;
                }
                let f: unsafe extern "C" fn($($ty),*) $(-> $ret)? = std::mem::transmute(p);
                f($($arg),*)
            }
        )*
    };
}

runtime_import! {
    Gtk: fn gtk_css_provider_new() -> gpointer = std::ptr::null_mut();
    Gtk: fn gtk_css_provider_load_from_data(
        provider: gpointer,
        data: *const c_char,
        length: isize,
        error: *mut *mut GError,
    ) -> gboolean = FALSE;
    Gtk: fn gtk_window_new(kind: c_int) -> *mut GtkWidget = std::ptr::null_mut();
    Gtk: fn gtk_header_bar_new() -> *mut GtkWidget = std::ptr::null_mut();
    Gtk: fn gtk_window_get_type() -> GType = 0;
    Gtk: fn gtk_header_bar_get_type() -> GType = 0;
    Gtk: fn gtk_buildable_get_type() -> GType = 0;
    Gtk: fn gtk_window_get_titlebar(window: *mut GtkWindow) -> *mut GtkWidget = std::ptr::null_mut();
    Gtk: fn gtk_style_context_add_class(context: *mut GtkStyleContext, class_name: *const c_char) = ();
    Gtk: fn gtk_style_context_remove_class(context: *mut GtkStyleContext, class_name: *const c_char) = ();
    Gtk: fn gtk_style_context_add_provider(
        context: *mut GtkStyleContext,
        provider: gpointer,
        priority: c_uint,
    ) = ();
    Gtk: fn gtk_widget_destroy(widget: *mut GtkWidget) = ();
    Gtk: fn gtk_widget_get_mapped(widget: *mut GtkWidget) -> gboolean = FALSE;
    Gtk: fn gtk_widget_get_realized(widget: *mut GtkWidget) -> gboolean = FALSE;
    Gtk: fn gtk_widget_get_style_context(widget: *mut GtkWidget) -> *mut GtkStyleContext =
        std::ptr::null_mut();
    Gtk: fn gtk_widget_map(widget: *mut GtkWidget) = ();
    Gtk: fn gtk_widget_set_parent(widget: *mut GtkWidget, parent: *mut GtkWidget) = ();
    Gtk: fn gtk_widget_unrealize(widget: *mut GtkWidget) = ();
    Gtk: fn gtk_widget_realize(widget: *mut GtkWidget) = ();
    Gtk: fn gtk_widget_get_settings(widget: *mut GtkWidget) -> *mut GtkSettings = std::ptr::null_mut();
    Gtk: fn gtk_widget_get_toplevel(widget: *mut GtkWidget) -> *mut GtkWidget = std::ptr::null_mut();

    Gdk: fn gdk_window_get_user_data(window: *mut GdkWindow, data: *mut gpointer) = ();

    Gobject: fn g_object_get_data(object: gpointer, key: *const c_char) -> gpointer = std::ptr::null_mut();
    Gobject: fn g_object_set_data(object: gpointer, key: *const c_char, data: gpointer) = ();
    Gobject: fn g_object_set_data_full(
        object: gpointer,
        key: *const c_char,
        data: gpointer,
        destroy: GDestroyNotify,
    ) = ();
    Gobject: fn g_object_ref(object: gpointer) -> gpointer = std::ptr::null_mut();
    Gobject: fn g_object_unref(object: gpointer) = ();
    Gobject: fn g_object_ref_sink(object: gpointer) -> gpointer = std::ptr::null_mut();
    Gobject: fn g_type_check_instance_is_a(instance: *mut GTypeInstance, iface_type: GType) -> gboolean = FALSE;
    Gobject: fn g_type_check_instance_is_fundamentally_a(
        instance: *mut GTypeInstance,
        fundamental_type: GType,
    ) -> gboolean = FALSE;
    Gobject: fn g_object_class_find_property(
        class: *mut GTypeClass,
        property_name: *const c_char,
    ) -> *mut GParamSpec = std::ptr::null_mut();
    Gobject: fn g_type_instance_get_private(instance: *mut GTypeInstance, private_type: GType) -> gpointer =
        std::ptr::null_mut();
    Gobject: fn g_type_value_table_peek(value_type: GType) -> *mut GTypeValueTable = std::ptr::null_mut();
    Gobject: fn g_signal_handlers_disconnect_matched(
        instance: gpointer,
        mask: c_uint,
        signal_id: c_uint,
        detail: u32,
        closure: gpointer,
        func: gpointer,
        data: gpointer,
    ) -> c_uint = 0;
    Gobject: fn g_object_get_property(object: gpointer, property_name: *const c_char, value: *mut GValue) = ();
    Gobject: fn g_value_init(value: *mut GValue, value_type: GType) -> *mut GValue = std::ptr::null_mut();
    Gobject: fn g_value_unset(value: *mut GValue) = ();
    Gobject: fn g_value_get_string(value: *const GValue) -> *const c_char = std::ptr::null();
    Gobject: fn g_value_get_boolean(value: *const GValue) -> gboolean = FALSE;

    Glib: fn g_free(mem: gpointer) = ();
    Glib: fn g_strdup(s: *const c_char) -> *mut c_char = std::ptr::null_mut();
}

/// Originals of the functions this library overrides.
pub mod real {
    use super::*;

    runtime_import! {
        Gtk: fn gtk_window_set_titlebar(window: *mut GtkWindow, titlebar: *mut GtkWidget) = ();
        Gtk: fn gtk_header_bar_set_show_close_button(bar: *mut GtkHeaderBar, setting: gboolean) = ();
        Gtk: fn gtk_header_bar_set_decoration_layout(bar: *mut GtkHeaderBar, layout: *const c_char) = ();
        Gtk: fn gtk_header_bar_get_decoration_layout(bar: *mut GtkHeaderBar) -> *const c_char =
            std::ptr::null();

        Gdk legacy: fn gdk_screen_is_composited(screen: *mut GdkScreen) -> gboolean = FALSE;
        Gdk legacy: fn gdk_window_set_decorations(window: *mut GdkWindow, decorations: c_int) = ();

        Gobject: fn g_type_register_static_simple(
            parent_type: GType,
            type_name: *const c_char,
            class_size: c_uint,
            class_init: GClassInitFunc,
            instance_size: c_uint,
            instance_init: GInstanceInitFunc,
            flags: c_uint,
        ) -> GType = 0;
        Gobject: fn g_type_add_interface_static(
            instance_type: GType,
            interface_type: GType,
            info: *const GInterfaceInfo,
        ) = ();
        Gobject: fn g_type_add_instance_private(class_type: GType, private_size: usize) -> c_int = 0;
        Gobject: fn g_signal_connect_data(
            instance: gpointer,
            detailed_signal: *const c_char,
            c_handler: GCallback,
            data: gpointer,
            destroy_data: GClosureNotify,
            connect_flags: c_uint,
        ) -> c_ulong = 0;

        Girepository: fn g_function_info_prep_invoker(
            info: *mut GIFunctionInfo,
            invoker: *mut GIFunctionInvoker,
            error: *mut *mut GError,
        ) -> gboolean = FALSE;
    }
}

/// `G_OBJECT_GET_CLASS`
pub unsafe fn object_class(object: gpointer) -> *mut GTypeClass {
    (*(object as *mut GTypeInstance)).g_class
}

/// `G_IS_OBJECT`
pub unsafe fn is_object(object: gpointer) -> bool {
    !object.is_null()
        && g_type_check_instance_is_fundamentally_a(object as *mut GTypeInstance, G_TYPE_OBJECT) != 0
}

/// Whether `instance` is a `type_id` (or derived from it).
pub unsafe fn is_a(instance: gpointer, type_id: GType) -> bool {
    !instance.is_null()
        && type_id != 0
        && g_type_check_instance_is_a(instance as *mut GTypeInstance, type_id) != 0
}

/// `g_signal_handlers_disconnect_by_func`
pub unsafe fn disconnect_by_func(instance: gpointer, func: gpointer, data: gpointer) -> c_uint {
    if instance.is_null() || func.is_null() {
        return 0;
    }
    g_signal_handlers_disconnect_matched(
        instance,
        G_SIGNAL_MATCH_FUNC | G_SIGNAL_MATCH_DATA,
        0,
        0,
        std::ptr::null_mut(),
        func,
        data,
    )
}
