//! MIME type inference from file extensions.

use std::path::Path;

/// Content type used when the extension is absent or unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Guesses the content type of `path` from its extension.
///
/// Uses the standard extension table and falls back to
/// [`DEFAULT_CONTENT_TYPE`] when no mapping exists.
#[must_use]
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}
