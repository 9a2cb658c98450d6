//! Identifier sanitization

/// Normalize an external id to the definition id charset
///
/// ASCII letters, digits, `_` and `-` are kept; every other character becomes
/// `_`. The character count never changes.
pub fn sanitize_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
