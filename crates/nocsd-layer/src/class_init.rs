//! Type-registration interception and the class-table wrappers it installs.
//!
//! The first registration of each well-known type gets its class (or
//! instance) initializer replaced by a wrapper. The wrapper runs the
//! toolkit's initializer, then swaps selected class-table slots for ours,
//! saving the previous value for delegation.

use std::ffi::CStr;
use std::sync::atomic::{AtomicI64, Ordering};

use libc::{c_char, c_int, c_uint};
use nocsd_config::log_intercept_debug;
use nocsd_core::session::{self, CompositeDisableGuard};
use nocsd_core::{OriginalSlot, TypeRegistry, WellKnownType};

use crate::ffi::*;
use crate::gate;
use crate::header_bar;
use crate::imports::{self, real};
use crate::overrides;
use crate::probe;
use crate::resolver;

pub static REGISTRY: TypeRegistry = TypeRegistry::new();

static WINDOW_REALIZE: OriginalSlot = OriginalSlot::new();
static DIALOG_CONSTRUCTOR: OriginalSlot = OriginalSlot::new();
static HEADER_BAR_SET_PROPERTY: OriginalSlot = OriginalSlot::new();
static HEADER_BAR_REALIZE: OriginalSlot = OriginalSlot::new();
static HEADER_BAR_UNREALIZE: OriginalSlot = OriginalSlot::new();
static HEADER_BAR_HIERARCHY_CHANGED: OriginalSlot = OriginalSlot::new();

/// Indexed by [`buildable_index`].
static BUILDABLE_INIT: [OriginalSlot; 2] = [OriginalSlot::new(), OriginalSlot::new()];
static BUILDABLE_ADD_CHILD: [OriginalSlot; 2] = [OriginalSlot::new(), OriginalSlot::new()];

unsafe fn saved<F: Copy>(slot: &OriginalSlot) -> Option<F> {
    slot.get()
        .map(|address| std::mem::transmute_copy::<usize, F>(&address))
}

/// Put `wrapper` into a class-table slot, remembering what was there.
unsafe fn swap_slot<F: Copy>(slot: &mut Option<F>, original: &OriginalSlot, wrapper: F) {
    if let Some(previous) = *slot {
        original.save_once(std::mem::transmute_copy::<F, usize>(&previous));
    }
    *slot = Some(wrapper);
}

unsafe fn chain_class_init(kind: WellKnownType, klass: gpointer, data: gpointer) {
    if let Some(init) = REGISTRY.original_init(kind) {
        let init: unsafe extern "C" fn(gpointer, gpointer) = std::mem::transmute(init);
        init(klass, data);
    }
}

/// Raised for the duration of a realize or dialog construction on toolkits
/// that decide on client-side decorations there.
fn realize_guard() -> Option<CompositeDisableGuard> {
    gate::active_band()
        .filter(|band| band.composite_on_realize)
        .map(|_| CompositeDisableGuard::enter())
}

// --- GtkWindow ---

unsafe extern "C" fn window_class_init(klass: gpointer, data: gpointer) {
    chain_class_init(WellKnownType::Window, klass, data);
    let widget_class = klass as *mut GtkWidgetClass;
    if !widget_class.is_null() {
        swap_slot(&mut (*widget_class).realize, &WINDOW_REALIZE, window_realize as WidgetFn);
    }
}

unsafe extern "C" fn window_realize(widget: *mut GtkWidget) {
    let _composite = realize_guard();
    if let Some(realize) = saved::<WidgetFn>(&WINDOW_REALIZE) {
        realize(widget);
    }
}

// --- GtkDialog ---

unsafe extern "C" fn dialog_class_init(klass: gpointer, data: gpointer) {
    chain_class_init(WellKnownType::Dialog, klass, data);
    let object_class = klass as *mut GObjectClass;
    if !object_class.is_null() {
        swap_slot(
            &mut (*object_class).constructor,
            &DIALOG_CONSTRUCTOR,
            dialog_constructor as ConstructorFn,
        );
    }
}

unsafe extern "C" fn dialog_constructor(
    type_id: GType,
    n_construct_properties: c_uint,
    construct_params: *mut GObjectConstructParam,
) -> *mut GTypeInstance {
    let _composite = realize_guard();
    match saved::<ConstructorFn>(&DIALOG_CONSTRUCTOR) {
        Some(constructor) => constructor(type_id, n_construct_properties, construct_params),
        None => std::ptr::null_mut(),
    }
}

// --- GtkHeaderBar ---

unsafe extern "C" fn header_bar_class_init(klass: gpointer, data: gpointer) {
    chain_class_init(WellKnownType::HeaderBar, klass, data);
    let widget_class = klass as *mut GtkWidgetClass;
    if widget_class.is_null() {
        return;
    }
    let object_class = &mut (*widget_class).parent_class;
    swap_slot(
        &mut object_class.set_property,
        &HEADER_BAR_SET_PROPERTY,
        header_bar_set_property as SetPropertyFn,
    );
    swap_slot(
        &mut (*widget_class).realize,
        &HEADER_BAR_REALIZE,
        header_bar_realize as WidgetFn,
    );
    swap_slot(
        &mut (*widget_class).unrealize,
        &HEADER_BAR_UNREALIZE,
        header_bar_unrealize as WidgetFn,
    );
    swap_slot(
        &mut (*widget_class).hierarchy_changed,
        &HEADER_BAR_HIERARCHY_CHANGED,
        header_bar_hierarchy_changed as HierarchyChangedFn,
    );
}

const PROP_UNKNOWN: i64 = -1;
const PROP_MISSING: i64 = -2;

/// Id of the `show-close-button` property, looked up once by name.
static SHOW_CLOSE_BUTTON_PROP: AtomicI64 = AtomicI64::new(PROP_UNKNOWN);

unsafe fn show_close_button_prop(object: *mut GTypeInstance) -> i64 {
    let known = SHOW_CLOSE_BUTTON_PROP.load(Ordering::Acquire);
    if known != PROP_UNKNOWN {
        return known;
    }
    let spec = imports::g_object_class_find_property(
        imports::object_class(object.cast()),
        c"show-close-button".as_ptr(),
    );
    let id = if spec.is_null() {
        PROP_MISSING
    } else {
        i64::from((*spec).param_id)
    };
    SHOW_CLOSE_BUTTON_PROP.store(id, Ordering::Release);
    id
}

/// The toolkit's property setter may have the close-button setter inlined,
/// so the property is routed through our override here as well.
unsafe extern "C" fn header_bar_set_property(
    object: *mut GTypeInstance,
    prop_id: c_uint,
    value: *const GValue,
    pspec: *mut GParamSpec,
) {
    if show_close_button_prop(object) == i64::from(prop_id) {
        overrides::gtk_header_bar_set_show_close_button(
            object.cast(),
            imports::g_value_get_boolean(value),
        );
        return;
    }
    if let Some(set_property) = saved::<SetPropertyFn>(&HEADER_BAR_SET_PROPERTY) {
        set_property(object, prop_id, value, pspec);
    }
}

unsafe extern "C" fn header_bar_realize(widget: *mut GtkWidget) {
    if let Some(realize) = saved::<WidgetFn>(&HEADER_BAR_REALIZE) {
        realize(widget);
    }
    // The header-bar probe realizes a bar itself.
    if session::in_probe() {
        return;
    }
    let Some(layout) = probe::header_bar_layout() else {
        return;
    };

    let settings: gpointer = imports::gtk_widget_get_settings(widget).cast();
    if settings.is_null() {
        return;
    }
    imports::disconnect_by_func(
        settings,
        layout.update_window_buttons as gpointer,
        widget.cast(),
    );
    for signal in [
        c"notify::gtk-shell-shows-app-menu",
        c"notify::gtk-decoration-layout",
    ] {
        real::g_signal_connect_data(
            settings,
            signal.as_ptr(),
            as_callback::<UpdateButtonsFn>(header_bar::update_window_buttons),
            widget.cast(),
            None,
            G_CONNECT_SWAPPED,
        );
    }
    header_bar::update_window_buttons(widget.cast());
}

unsafe extern "C" fn header_bar_unrealize(widget: *mut GtkWidget) {
    let settings: gpointer = imports::gtk_widget_get_settings(widget).cast();
    imports::disconnect_by_func(
        settings,
        header_bar::update_window_buttons as gpointer,
        widget.cast(),
    );
    if let Some(unrealize) = saved::<WidgetFn>(&HEADER_BAR_UNREALIZE) {
        unrealize(widget);
    }
}

unsafe extern "C" fn header_bar_hierarchy_changed(
    widget: *mut GtkWidget,
    previous_toplevel: *mut GtkWidget,
) {
    // Older toolkits have no handler; nothing to take over then.
    let Some(hierarchy_changed) = saved::<HierarchyChangedFn>(&HEADER_BAR_HIERARCHY_CHANGED)
    else {
        return;
    };
    hierarchy_changed(widget, previous_toplevel);
    if session::in_probe() {
        return;
    }

    imports::disconnect_by_func(
        previous_toplevel.cast(),
        header_bar::window_state_changed as gpointer,
        widget.cast(),
    );

    let Some(layout) = probe::header_bar_layout() else {
        return;
    };
    let toplevel = imports::gtk_widget_get_toplevel(widget);
    if !toplevel.is_null() {
        if let Some(original) = layout.window_state_changed {
            imports::disconnect_by_func(toplevel.cast(), original as gpointer, widget.cast());
        }
        let handler: WindowStateFn = header_bar::window_state_changed;
        real::g_signal_connect_data(
            toplevel.cast(),
            c"window-state-event".as_ptr(),
            as_callback(handler),
            widget.cast(),
            None,
            G_CONNECT_AFTER,
        );
    }
    header_bar::update_window_buttons(widget.cast());
}

/// `G_CALLBACK`
pub(crate) fn as_callback<F: Copy>(f: F) -> GCallback {
    Some(unsafe { std::mem::transmute_copy::<F, unsafe extern "C" fn()>(&f) })
}

// --- GtkShortcutsWindow ---

/// Its instance init installs a header bar through GTK's internal setter,
/// so it is reassigned through ours.
unsafe extern "C" fn shortcuts_window_init(instance: *mut GTypeInstance, klass: gpointer) {
    if let Some(init) = REGISTRY.original_init(WellKnownType::ShortcutsWindow) {
        let init: unsafe extern "C" fn(*mut GTypeInstance, gpointer) = std::mem::transmute(init);
        init(instance, klass);
    }

    let window: *mut GtkWindow = instance.cast();
    let titlebar = imports::gtk_window_get_titlebar(window);
    if !imports::is_a(titlebar.cast(), imports::gtk_header_bar_get_type()) {
        return;
    }
    // Unsetting drops the window's only reference.
    imports::g_object_ref(titlebar.cast());
    real::gtk_window_set_titlebar(window, std::ptr::null_mut());
    overrides::gtk_window_set_titlebar(window, titlebar);
    imports::g_object_unref(titlebar.cast());
}

// --- GtkBuildable on GtkWindow / GtkDialog ---

fn buildable_index(kind: WellKnownType) -> Option<usize> {
    match kind {
        WellKnownType::Window => Some(0),
        WellKnownType::Dialog => Some(1),
        _ => None,
    }
}

unsafe fn buildable_init(index: usize, iface: gpointer, data: gpointer) {
    if let Some(init) = saved::<unsafe extern "C" fn(gpointer, gpointer)>(&BUILDABLE_INIT[index]) {
        init(iface, data);
    }
    let iface = iface as *mut GtkBuildableIface;
    if iface.is_null() {
        return;
    }
    let wrapper: BuildableAddChildFn = if index == 0 {
        window_buildable_add_child
    } else {
        dialog_buildable_add_child
    };
    swap_slot(&mut (*iface).add_child, &BUILDABLE_ADD_CHILD[index], wrapper);
}

unsafe extern "C" fn window_buildable_init(iface: gpointer, data: gpointer) {
    buildable_init(0, iface, data);
}

unsafe extern "C" fn dialog_buildable_init(iface: gpointer, data: gpointer) {
    buildable_init(1, iface, data);
}

/// A `<child type="titlebar">` goes through our title-bar setter.
unsafe fn buildable_add_child(
    index: usize,
    buildable: *mut GTypeInstance,
    builder: *mut GtkBuilder,
    child: *mut GTypeInstance,
    child_type: *const c_char,
) {
    if !child_type.is_null() && CStr::from_ptr(child_type).to_bytes() == b"titlebar" {
        overrides::gtk_window_set_titlebar(buildable.cast(), child.cast());
        return;
    }
    if let Some(add_child) = saved::<BuildableAddChildFn>(&BUILDABLE_ADD_CHILD[index]) {
        add_child(buildable, builder, child, child_type);
    }
}

unsafe extern "C" fn window_buildable_add_child(
    buildable: *mut GTypeInstance,
    builder: *mut GtkBuilder,
    child: *mut GTypeInstance,
    child_type: *const c_char,
) {
    buildable_add_child(0, buildable, builder, child, child_type);
}

unsafe extern "C" fn dialog_buildable_add_child(
    buildable: *mut GTypeInstance,
    builder: *mut GtkBuilder,
    child: *mut GTypeInstance,
    child_type: *const c_char,
) {
    buildable_add_child(1, buildable, builder, child, child_type);
}

// --- exported registration entry points ---

pub(crate) fn address_of<F: Copy>(f: Option<F>) -> usize {
    f.map_or(0, |f| unsafe { std::mem::transmute_copy::<F, usize>(&f) })
}

#[no_mangle]
pub unsafe extern "C" fn g_type_register_static_simple(
    parent_type: GType,
    type_name: *const c_char,
    class_size: c_uint,
    class_init: GClassInitFunc,
    instance_size: c_uint,
    instance_init: GInstanceInitFunc,
    flags: c_uint,
) -> GType {
    let kind = if type_name.is_null() {
        None
    } else {
        WellKnownType::from_type_name(CStr::from_ptr(type_name).to_bytes())
    };

    let mut class_init = class_init;
    let mut instance_init = instance_init;
    if let Some(kind) = kind {
        let original = match kind {
            WellKnownType::ShortcutsWindow => address_of(instance_init),
            _ => address_of(class_init),
        };
        if REGISTRY.capture_init(kind, original) {
            resolver::detect_legacy(original);
            if gate::patchable() {
                match kind {
                    WellKnownType::Window => class_init = Some(window_class_init),
                    WellKnownType::Dialog => class_init = Some(dialog_class_init),
                    WellKnownType::HeaderBar => class_init = Some(header_bar_class_init),
                    WellKnownType::ShortcutsWindow => instance_init = Some(shortcuts_window_init),
                }
                log_intercept_debug!("type initializer wrapped", type_name = kind.type_name());
            }
        }
    }

    let type_id = real::g_type_register_static_simple(
        parent_type,
        type_name,
        class_size,
        class_init,
        instance_size,
        instance_init,
        flags,
    );
    if let Some(kind) = kind {
        REGISTRY.record_type_id(kind, type_id);
    }
    type_id
}

#[no_mangle]
pub unsafe extern "C" fn g_type_add_interface_static(
    instance_type: GType,
    interface_type: GType,
    info: *const GInterfaceInfo,
) {
    if info.is_null() {
        real::g_type_add_interface_static(instance_type, interface_type, info);
        return;
    }
    resolver::detect_legacy(address_of((*info).interface_init));

    let index = REGISTRY.lookup(instance_type).and_then(buildable_index);
    if let Some(index) = index {
        if gate::patchable() && interface_type == imports::gtk_buildable_get_type() {
            if let Some(init) = (*info).interface_init {
                BUILDABLE_INIT[index].save_once(address_of(Some(init)));
            }
            let wrapped = GInterfaceInfo {
                interface_init: Some(if index == 0 {
                    window_buildable_init
                } else {
                    dialog_buildable_init
                }),
                interface_finalize: (*info).interface_finalize,
                interface_data: (*info).interface_data,
            };
            real::g_type_add_interface_static(instance_type, interface_type, &wrapped);
            return;
        }
    }
    real::g_type_add_interface_static(instance_type, interface_type, info);
}

/// Records the private-data size of the well-known types; the probes scan
/// exactly that many bytes.
#[no_mangle]
pub unsafe extern "C" fn g_type_add_instance_private(
    class_type: GType,
    private_size: usize,
) -> c_int {
    let offset = real::g_type_add_instance_private(class_type, private_size);
    if let Some(kind) = REGISTRY.record_private_size(class_type, private_size) {
        log_intercept_debug!(
            "private data size recorded",
            type_name = kind.type_name(),
            size = private_size
        );
    }
    offset
}
