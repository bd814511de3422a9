//! Clipboard helper for the delivery fallback.

use crate::{DeskhookError, Result};

/// Copy `text` to the system clipboard.
///
/// This is the universal recovery path: whenever the extension cannot take a
/// prompt, the composed text lands here so nothing the user wrote is lost.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut cb = arboard::Clipboard::new()
        .map_err(|e| DeskhookError::Clipboard(format!("clipboard unavailable: {e}")))?;

    cb.set_text(text.to_string())
        .map_err(|e| DeskhookError::Clipboard(format!("could not write clipboard: {e}")))
}
