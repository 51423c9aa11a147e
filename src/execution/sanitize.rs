//! Folder name sanitization

/// Characters that are illegal in a directory name on at least one platform
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Substituted when sanitizing leaves nothing
pub const DEFAULT_FOLDER_NAME: &str = "Unnamed_Folder";

/// Make a cluster name safe to use as a directory name
///
/// Replaces illegal and control characters with `_`, caps the length at
/// `max_len` characters, trims leading/trailing spaces and dots, and falls
/// back to [`DEFAULT_FOLDER_NAME`] if nothing is left.
pub fn sanitize_folder_name(name: &str, max_len: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .take(max_len)
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');

    if trimmed.is_empty() {
        DEFAULT_FOLDER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
