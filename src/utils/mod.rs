//! Shared utility functions
//!
//! Path helpers used across the index, the synchronizer and the identity store.

use std::path::{Component, Path};

/// Check whether `path` lies inside `dir` (or is `dir` itself)
///
/// Comparison is component-wise, so `/a/bfile` is NOT within `/a/b`.
/// `.` components are ignored on both sides.
pub fn path_is_within(path: &Path, dir: &Path) -> bool {
    let mut path_parts = path.components().filter(|c| !matches!(c, Component::CurDir));
    for dir_part in dir.components().filter(|c| !matches!(c, Component::CurDir)) {
        match path_parts.next() {
            Some(part) if part == dir_part => {}
            _ => return false,
        }
    }
    true
}

/// Check whether any component of `path` below `root` is hidden (starts with `.`)
///
/// Paths outside `root` are checked over all of their normal components.
pub fn is_hidden_relative(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Lower-cased extension of a path, without the dot
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Whether the path carries one of the given (lower-case) extensions
pub fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    extension_lower(path)
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)))
        .unwrap_or(false)
}

/// First `max_chars` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
