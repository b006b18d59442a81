//! C ABI of the GObject/GTK structures the layer reads or patches.
//!
//! Only leading prefixes are declared. Class records are never allocated by
//! us, so trailing members the layer does not touch are omitted.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_uint, c_void};

pub type GType = usize;
pub type gboolean = c_int;
pub type gpointer = *mut c_void;
pub type gconstpointer = *const c_void;

pub const FALSE: gboolean = 0;
pub const TRUE: gboolean = 1;

/// `G_TYPE_OBJECT`, fundamental id 20 shifted by `G_TYPE_FUNDAMENTAL_SHIFT`.
pub const G_TYPE_OBJECT: GType = 20 << 2;

pub const G_CONNECT_AFTER: c_uint = 1 << 0;
pub const G_CONNECT_SWAPPED: c_uint = 1 << 1;

pub const G_SIGNAL_MATCH_FUNC: c_uint = 1 << 3;
pub const G_SIGNAL_MATCH_DATA: c_uint = 1 << 4;

pub const GDK_DECOR_ALL: c_int = 1 << 0;
pub const GDK_DECOR_BORDER: c_int = 1 << 1;

pub const GDK_WINDOW_STATE_MAXIMIZED: c_int = 1 << 2;
pub const GDK_WINDOW_STATE_FULLSCREEN: c_int = 1 << 4;
pub const GDK_WINDOW_STATE_TILED: c_int = 1 << 8;

pub const GTK_WINDOW_TOPLEVEL: c_int = 0;
pub const GTK_STYLE_PROVIDER_PRIORITY_SETTINGS: c_uint = 400;

// Opaque handles.
#[repr(C)]
pub struct GtkWidget {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GtkWindow {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GtkHeaderBar {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GtkSettings {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GtkStyleContext {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GtkBuilder {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GdkWindow {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GdkScreen {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GIFunctionInfo {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GError {
    _private: [u8; 0],
}
#[repr(C)]
pub struct GObjectConstructParam {
    _private: [u8; 0],
}

pub type GCallback = Option<unsafe extern "C" fn()>;
pub type GClosureNotify = Option<unsafe extern "C" fn(gpointer, gpointer)>;
pub type GDestroyNotify = Option<unsafe extern "C" fn(gpointer)>;
pub type GClassInitFunc = Option<unsafe extern "C" fn(gpointer, gpointer)>;
pub type GInstanceInitFunc = Option<unsafe extern "C" fn(*mut GTypeInstance, gpointer)>;
pub type GInterfaceInitFunc = Option<unsafe extern "C" fn(gpointer, gpointer)>;
pub type GInterfaceFinalizeFunc = Option<unsafe extern "C" fn(gpointer, gpointer)>;

#[repr(C)]
pub struct GTypeClass {
    pub g_type: GType,
}

#[repr(C)]
pub struct GTypeInstance {
    pub g_class: *mut GTypeClass,
}

#[repr(C)]
pub struct GTypeInterface {
    pub g_type: GType,
    pub g_instance_type: GType,
}

#[repr(C)]
pub struct GInterfaceInfo {
    pub interface_init: GInterfaceInitFunc,
    pub interface_finalize: GInterfaceFinalizeFunc,
    pub interface_data: gpointer,
}

#[repr(C)]
pub struct GParamSpec {
    pub g_type_instance: GTypeInstance,
    pub name: *const c_char,
    pub flags: c_int,
    pub value_type: GType,
    pub owner_type: GType,
    _nick: *mut c_char,
    _blurb: *mut c_char,
    qdata: gpointer,
    ref_count: c_uint,
    pub param_id: c_uint,
}

#[repr(C)]
pub struct GValue {
    pub g_type: GType,
    data: [u64; 2],
}

impl GValue {
    /// `G_VALUE_INIT`
    pub const fn zeroed() -> Self {
        Self {
            g_type: 0,
            data: [0; 2],
        }
    }
}

#[repr(C)]
pub union GTypeCValue {
    pub v_int: c_int,
    pub v_long: libc::c_long,
    pub v_int64: i64,
    pub v_double: f64,
    pub v_pointer: gpointer,
}

#[repr(C)]
pub struct GTypeValueTable {
    pub value_init: Option<unsafe extern "C" fn(*mut GValue)>,
    pub value_free: Option<unsafe extern "C" fn(*mut GValue)>,
    pub value_copy: Option<unsafe extern "C" fn(*const GValue, *mut GValue)>,
    pub value_peek_pointer: Option<unsafe extern "C" fn(*const GValue) -> gpointer>,
    pub collect_format: *const c_char,
    pub collect_value:
        Option<unsafe extern "C" fn(*mut GValue, c_uint, *mut GTypeCValue, c_uint) -> *mut c_char>,
    pub lcopy_format: *const c_char,
    pub lcopy_value:
        Option<unsafe extern "C" fn(*const GValue, c_uint, *mut GTypeCValue, c_uint) -> *mut c_char>,
}

pub type ConstructorFn =
    unsafe extern "C" fn(GType, c_uint, *mut GObjectConstructParam) -> *mut GTypeInstance;
pub type SetPropertyFn =
    unsafe extern "C" fn(*mut GTypeInstance, c_uint, *const GValue, *mut GParamSpec);
pub type WidgetFn = unsafe extern "C" fn(*mut GtkWidget);
pub type HierarchyChangedFn = unsafe extern "C" fn(*mut GtkWidget, *mut GtkWidget);

#[repr(C)]
pub struct GObjectClass {
    pub g_type_class: GTypeClass,
    construct_properties: gpointer,
    pub constructor: Option<ConstructorFn>,
    pub set_property: Option<SetPropertyFn>,
    pub get_property: gpointer,
    pub dispose: gpointer,
    pub finalize: gpointer,
    pub dispatch_properties_changed: gpointer,
    pub notify: gpointer,
    pub constructed: gpointer,
    flags: usize,
    pdummy: [gpointer; 6],
}

#[repr(C)]
pub struct GtkWidgetClass {
    pub parent_class: GObjectClass,
    pub activate_signal: c_uint,
    pub dispatch_child_properties_changed: gpointer,
    pub destroy: Option<WidgetFn>,
    pub show: Option<WidgetFn>,
    pub show_all: Option<WidgetFn>,
    pub hide: Option<WidgetFn>,
    pub map: Option<WidgetFn>,
    pub unmap: Option<WidgetFn>,
    pub realize: Option<WidgetFn>,
    pub unrealize: Option<WidgetFn>,
    pub size_allocate: gpointer,
    pub state_changed: gpointer,
    pub state_flags_changed: gpointer,
    pub parent_set: gpointer,
    pub hierarchy_changed: Option<HierarchyChangedFn>,
}

pub type BuildableAddChildFn =
    unsafe extern "C" fn(*mut GTypeInstance, *mut GtkBuilder, *mut GTypeInstance, *const c_char);

#[repr(C)]
pub struct GtkBuildableIface {
    pub g_iface: GTypeInterface,
    pub set_name: gpointer,
    pub get_name: gpointer,
    pub add_child: Option<BuildableAddChildFn>,
}

#[repr(C)]
pub struct GdkEventWindowState {
    pub event_type: c_int,
    pub window: *mut GdkWindow,
    pub send_event: i8,
    pub changed_mask: c_int,
    pub new_window_state: c_int,
}

/// libffi's `ffi_cif` on the 64-bit targets the layer builds for.
#[repr(C)]
pub struct FfiCif {
    abi: c_int,
    nargs: c_uint,
    arg_types: gpointer,
    rtype: gpointer,
    bytes: c_uint,
    flags: c_uint,
}

#[repr(C)]
pub struct GIFunctionInvoker {
    pub cif: FfiCif,
    pub native_address: gpointer,
    padding: [gpointer; 15],
}

/// Callback GTK connects to a title bar's `notify::title`.
pub type TitleNotifyFn = unsafe extern "C" fn(*mut GtkHeaderBar, *mut GParamSpec, *mut GtkWindow);
/// GTK's internal header-bar button rebuild.
pub type UpdateButtonsFn = unsafe extern "C" fn(*mut GtkHeaderBar);
/// GTK's internal header-bar `window-state-event` handler.
pub type WindowStateFn =
    unsafe extern "C" fn(*mut GtkWidget, *mut GdkEventWindowState, gpointer) -> gboolean;

// Compile-time checks of the declared prefixes.
#[cfg(target_pointer_width = "64")]
mod layout_checks {
    use super::*;
    use std::mem::{offset_of, size_of};

    const _: () = assert!(size_of::<GValue>() == 24);
    const _: () = assert!(size_of::<GObjectClass>() == 136);
    const _: () = assert!(offset_of!(GObjectClass, set_property) == 24);
    const _: () = assert!(offset_of!(GtkWidgetClass, realize) == 136 + 8 + 7 * 8);
    const _: () = assert!(offset_of!(GParamSpec, param_id) == 68);
    const _: () = assert!(offset_of!(GIFunctionInvoker, native_address) == 32);
}
