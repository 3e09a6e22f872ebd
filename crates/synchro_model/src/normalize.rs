//! Identifier normalization.
//!
//! Turns raw contact fields into the canonical keys used for matching.
//! Two values with the same non-empty key are treated as the same person.
//! This is a heuristic: short or shared numbers can collide, and the
//! trailing-ten-digit rule ignores country codes.

/// Number of trailing digits kept from a phone number.
pub const PHONE_KEY_DIGITS: usize = 10;

/// Inputs with fewer digits than this produce no phone key.
pub const MIN_PHONE_DIGITS: usize = 7;

/// Normalizes a phone number into a matching key.
///
/// Strips every non-digit character and keeps the trailing ten digits, so
/// `"+1 (555) 123-4567"` and `"5551234567"` share a key. Returns `None` for
/// input with fewer than [`MIN_PHONE_DIGITS`] digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }
    let start = digits.len().saturating_sub(PHONE_KEY_DIGITS);
    Some(digits[start..].iter().collect())
}

/// Normalizes an email address into a matching key (trimmed, lowercase).
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes a display name into a matching key (trimmed, lowercase).
///
/// Names are not unique, so this key is only the last-resort fallback.
pub fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}
