//! # nocsd-core
//!
//! The parts of the nocsd preload layer that do not touch the toolkit:
//!
//! - [`layout`]: decoration-layout rewriting
//! - [`session`]: per-thread counters, probe marker and signal capture
//! - [`gate`]: latched toolkit compatibility decision
//! - [`probe`]: probe-once result cells and the pointer-slot scanner
//! - [`plan`]: what each override does for a given band and object state
//! - [`registry`]: well-known type ids and saved class-table slots
//!
//! The cdylib wires these to the real toolkit entry points.

pub mod error;
pub mod gate;
pub mod layout;
pub mod plan;
pub mod probe;
pub mod registry;
pub mod session;

pub use error::{LayoutError, ProbeError, Result};
pub use gate::{is_patchable, CapabilityGate, Compatibility, VersionCheck};
pub use layout::{strip_window_buttons, strip_window_buttons_bytes, MAX_LAYOUT_LEN};
pub use plan::{
    button_update_plan, close_button_plan, stripped_copy_plan, throwaway_release, titlebar_plan,
    ButtonUpdate, CloseButtonPlan, StrippedCopy, ThrowawayRelease, TitlebarPlan,
};
pub use probe::{find_unique_pointer, ProbeCell, ProbeState};
pub use registry::{OriginalSlot, TypeRegistry, WellKnownType};
pub use session::{
    CaptureGuard, CaptureTarget, CompositeDisableGuard, LayoutOverrideGuard, ProbeGuard,
};
