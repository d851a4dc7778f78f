//! Identifier and right normalization.
//!
//! External ids arrive as strings. Only the canonical hyphenated UUID form is
//! accepted; anything else is rejected here, before storage is touched.

use uuid::Uuid;

const CANONICAL_LEN: usize = 36;

/// Parse a raw external identifier into a typed id.
///
/// Returns `None` for missing, empty, nil or non-canonical input.
pub fn normalize_id<T: From<Uuid>>(raw: Option<&str>) -> Option<T> {
    let trimmed = raw?.trim();
    if trimmed.len() != CANONICAL_LEN {
        return None;
    }

    let id = Uuid::try_parse(trimmed).ok()?;
    if id.is_nil() {
        return None;
    }

    // try_parse also accepts braced/urn/simple forms; the length check rules
    // those out, so only confirm the hyphen positions round-trip.
    let mut buf = Uuid::encode_buffer();
    let canonical = id.hyphenated().encode_lower(&mut buf);
    if !canonical.eq_ignore_ascii_case(trimmed) {
        return None;
    }

    Some(T::from(id))
}

/// Trim a requested right. `None` becomes the empty "no right" sentinel.
pub fn normalize_right(raw: Option<&str>) -> String {
    raw.map(str::trim).unwrap_or_default().to_string()
}
