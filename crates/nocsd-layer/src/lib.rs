//! # nocsd-layer
//!
//! Preload library that keeps GTK 3 windows decorated by the window
//! manager. Load it with `LD_PRELOAD` (or `dlopen` it before the toolkit)
//! and title bars set by the application are placed inside the window
//! instead of replacing the server-side frame.
//!
//! Nothing runs at load time. Every exported override decides on first
//! call whether the running toolkit can be patched, and delegates to the
//! original otherwise. Set `GTK_CSD=1` to opt out.

// Exported overrides are C ABI entry points; their contracts are GTK's.
#![allow(clippy::missing_safety_doc)]

pub mod class_init;
pub mod ffi;
pub mod gate;
pub mod header_bar;
pub mod imports;
pub mod overrides;
pub mod probe;
pub mod resolver;
pub mod style;

/// Releases the library handles the resolver took, when the process exits
/// or the layer is unloaded.
#[used]
#[link_section = ".fini_array"]
static RELEASE_HANDLES: extern "C" fn() = on_unload;

extern "C" fn on_unload() {
    unsafe { resolver::release_handles() }
}
