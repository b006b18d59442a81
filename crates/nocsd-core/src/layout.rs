//! Decoration layout rewriting.
//!
//! A layout is `"left:right"`, each side a comma separated list of button
//! names. Window-manager buttons are removed, everything else (custom
//! entries, empty entries, the separator) is kept in place.

use crate::error::LayoutError;

/// Longest layout accepted, in bytes, excluding the terminator.
pub const MAX_LAYOUT_LEN: usize = 255;

/// Buttons drawn by the window manager once client-side decorations are off.
pub const RESERVED_BUTTONS: [&str; 4] = ["icon", "minimize", "maximize", "close"];

const GROUP_SEPARATOR: u8 = b':';
const BUTTON_SEPARATOR: u8 = b',';

fn is_reserved(token: &[u8]) -> bool {
    RESERVED_BUTTONS.iter().any(|r| r.as_bytes() == token)
}

/// Strip reserved buttons from a raw (not necessarily UTF-8) layout.
///
/// Only the first `:` separates groups; anything after it belongs to the
/// second group verbatim.
pub fn strip_window_buttons_bytes(layout: &[u8]) -> Result<Vec<u8>, LayoutError> {
    if layout.len() > MAX_LAYOUT_LEN {
        return Err(LayoutError::TooLong {
            len: layout.len(),
            max: MAX_LAYOUT_LEN,
        });
    }

    let mut out = Vec::with_capacity(layout.len());
    for (i, group) in layout.splitn(2, |b| *b == GROUP_SEPARATOR).enumerate() {
        if i > 0 {
            out.push(GROUP_SEPARATOR);
        }
        let mut kept = 0;
        for token in group.split(|b| *b == BUTTON_SEPARATOR) {
            if is_reserved(token) {
                continue;
            }
            if kept > 0 {
                out.push(BUTTON_SEPARATOR);
            }
            out.extend_from_slice(token);
            kept += 1;
        }
    }
    Ok(out)
}

/// [`strip_window_buttons_bytes`] for `str` input.
pub fn strip_window_buttons(layout: &str) -> Result<String, LayoutError> {
    let stripped = strip_window_buttons_bytes(layout.as_bytes())?;
    // Splitting only happens on ASCII separators, so the pieces stay UTF-8.
    Ok(String::from_utf8_lossy(&stripped).into_owned())
}
