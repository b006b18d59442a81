//! Stylesheet for title bars that are placed without client-side
//! decorations.

use once_cell::sync::OnceCell;

use crate::ffi::*;
use crate::imports;

/// Removes the padding and border a header bar keeps when it sits in a
/// server-decorated window, and the rounded top corners that would leave
/// gaps at the window edge. Selectors match the specificity themes use.
const TITLEBAR_CSS: &std::ffi::CStr = c"window > .titlebar:not(headerbar) {
  padding: 0;
  border-style: none;
  border-color: transparent;
}
.background:not(.tiled):not(.maximized) .titlebar:backdrop,
.background:not(.tiled):not(.maximized) .titlebar {
  border-top-left-radius: 0;
  border-top-right-radius: 0;
}
";

/// Above theme settings, below anything the application installs.
const PRIORITY: libc::c_uint = GTK_STYLE_PROVIDER_PRIORITY_SETTINGS + 50;

static PROVIDER: OnceCell<usize> = OnceCell::new();

unsafe fn provider() -> Option<gpointer> {
    PROVIDER
        .get_or_try_init(|| {
            let provider = imports::gtk_css_provider_new();
            if provider.is_null() {
                return Err(());
            }
            imports::gtk_css_provider_load_from_data(
                provider,
                TITLEBAR_CSS.as_ptr(),
                -1,
                std::ptr::null_mut(),
            );
            Ok(provider as usize)
        })
        .ok()
        .map(|p| *p as gpointer)
}

/// Attach the stylesheet to `widget`. Adding it twice is a no-op in GTK.
pub unsafe fn attach_titlebar_css(widget: *mut GtkWidget) {
    let context = imports::gtk_widget_get_style_context(widget);
    if context.is_null() {
        return;
    }
    if let Some(provider) = provider() {
        imports::gtk_style_context_add_provider(context, provider, PRIORITY);
    }
}
