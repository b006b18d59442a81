//! Decisions behind the exported overrides.
//!
//! Each function here picks what an override does from the active band and
//! what is known about the object. The layer carries the choice out against
//! the toolkit.

use nocsd_config::{BandPolicy, CloseButtonStrategy, TitlebarStrategy};

use crate::layout::strip_window_buttons_bytes;

/// How a title-bar assignment is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlebarPlan<T> {
    /// Patching is off; the toolkit's setter runs untouched.
    Delegate,
    /// Store the title bar through the window's private slot.
    DirectAssign(T),
    /// Run the toolkit's setter with compositing reported unavailable and
    /// tag the window as having a custom title.
    CompositeHack,
}

/// `window_layout` is only consulted for bands that assign directly, and
/// only when there is a title bar to assign. Unsetting always goes through
/// the toolkit.
pub fn titlebar_plan<T>(
    band: Option<&BandPolicy>,
    titlebar_present: bool,
    window_layout: impl FnOnce() -> Option<T>,
) -> TitlebarPlan<T> {
    let Some(band) = band else {
        return TitlebarPlan::Delegate;
    };
    if band.titlebar == TitlebarStrategy::DirectAssign && titlebar_present {
        if let Some(layout) = window_layout() {
            return TitlebarPlan::DirectAssign(layout);
        }
    }
    TitlebarPlan::CompositeHack
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseButtonPlan {
    /// Value handed to the toolkit's setter.
    pub setting: bool,
    /// Rebuild the header-bar buttons afterwards.
    pub fixup: bool,
}

pub fn close_button_plan(band: Option<&BandPolicy>, requested: bool) -> CloseButtonPlan {
    match band.map(|b| b.close_button) {
        Some(CloseButtonStrategy::ForceHidden) => CloseButtonPlan {
            setting: false,
            fixup: false,
        },
        Some(CloseButtonStrategy::LayoutFixup) => CloseButtonPlan {
            setting: requested,
            fixup: true,
        },
        None => CloseButtonPlan {
            setting: requested,
            fixup: false,
        },
    }
}

/// How the toolkit's header-bar button rebuild is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonUpdate {
    /// Run it as is.
    Plain,
    /// Run it with the bar's own layout temporarily replaced by this one.
    SwapLayout(Vec<u8>),
    /// The bar has no layout of its own; run it while the global setting
    /// is read back stripped.
    OverrideGlobal,
}

/// `private_layout` is the bar's own layout, `None` when it has none.
pub fn button_update_plan(private_layout: Option<&[u8]>) -> ButtonUpdate {
    match private_layout {
        None => ButtonUpdate::OverrideGlobal,
        Some(layout) => match strip_window_buttons_bytes(layout) {
            Ok(stripped) => ButtonUpdate::SwapLayout(stripped),
            Err(_) => ButtonUpdate::Plain,
        },
    }
}

/// What the decoration-layout getter hands out.
///
/// The stripped copy is owned by the header bar and must stay valid until
/// the layout changes, so it is only replaced when its source differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrippedCopy {
    /// The stored copy still matches; return it again.
    Reuse,
    /// Store this copy (and the layout it came from), then return it.
    Replace(Vec<u8>),
    /// The layout cannot be rewritten; return the toolkit's string.
    Passthrough,
}

/// `cached_source` is the layout the stored copy was made from, if a copy
/// is stored at all.
pub fn stripped_copy_plan(cached_source: Option<&[u8]>, current: &[u8]) -> StrippedCopy {
    if cached_source == Some(current) {
        return StrippedCopy::Reuse;
    }
    match strip_window_buttons_bytes(current) {
        Ok(stripped) => StrippedCopy::Replace(stripped),
        Err(_) => StrippedCopy::Passthrough,
    }
}

/// Which throwaway objects from layout discovery need releasing on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrowawayRelease {
    pub container: bool,
    /// A child that was never attached is still floating and owned by
    /// nobody.
    pub detached_child: bool,
}

pub fn throwaway_release(container: bool, child: bool, attached: bool) -> ThrowawayRelease {
    ThrowawayRelease {
        container,
        detached_child: child && !(attached && container),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nocsd_config::{PolicyTable, ToolkitVersion};

    fn band(version: &str) -> BandPolicy {
        let table = PolicyTable::builtin();
        let v: ToolkitVersion = version.parse().unwrap();
        table.band(table.select_for(v).unwrap()).unwrap().clone()
    }

    #[test]
    fn test_titlebar_skips_layout_lookup_for_composite_hack() {
        let old = band("3.12.0");
        let plan = titlebar_plan(Some(&old), true, || -> Option<u8> {
            panic!("layout looked up for a composite-hack band")
        });
        assert_eq!(plan, TitlebarPlan::CompositeHack);
    }

    #[test]
    fn test_titlebar_unset_never_assigns_directly() {
        let new = band("3.22.0");
        let plan = titlebar_plan(Some(&new), false, || Some(8usize));
        assert_eq!(plan, TitlebarPlan::CompositeHack);
    }

    #[test]
    fn test_button_update_over_length_runs_plain() {
        let long = vec![b'a'; crate::MAX_LAYOUT_LEN + 1];
        assert_eq!(button_update_plan(Some(&long)), ButtonUpdate::Plain);
    }

    #[test]
    fn test_throwaway_release() {
        let attached = throwaway_release(true, true, true);
        assert!(attached.container && !attached.detached_child);

        let detached = throwaway_release(true, true, false);
        assert!(detached.container && detached.detached_child);

        let no_window = throwaway_release(false, true, false);
        assert!(!no_window.container && no_window.detached_child);
    }
}
