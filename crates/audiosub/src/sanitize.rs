//! Helpers for sanitizing data before it enters tracing spans or responses.
//!
//! Artifact paths live under the work directory and may reveal the host
//! layout, so spans only ever carry the file name.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips any directory components a client put into an upload name.
///
/// Browsers on Windows have been known to send `C:\Users\...\clip.mp3`, so
/// both separators are treated as boundaries.
pub fn client_filename(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Makes a filename safe for a `Content-Disposition` header value.
pub fn header_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
