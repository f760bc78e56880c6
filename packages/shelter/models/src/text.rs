//! Text cleanup applied to staff-entered strings before they are stored.
//!
//! Spreadsheets and old forms often deliver UTF-8 text that was decoded as
//! Latin-1 somewhere along the way ("Ã¡gua" instead of "água"). The repair
//! is best-effort: when re-encoding fails the trimmed input is kept.
//! Output is always composed to NFC so that decomposed input ("A" plus a
//! combining acute) compares equal to precomposed text.

use unicode_normalization::UnicodeNormalization as _;

/// Trims the value, repairs Latin-1 mojibake when detected, and composes
/// the result to NFC.
#[must_use]
pub fn normalize_text(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.contains(['Ã', 'Â']) {
        if let Some(decoded) = decode_mojibake(trimmed) {
            return decoded.nfc().collect();
        }
    }
    trimmed.nfc().collect()
}

/// Normalizes an optional value, mapping empty results to `None`.
#[must_use]
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(normalize_text).filter(|v| !v.is_empty())
}

fn decode_mojibake(value: &str) -> Option<String> {
    let bytes = value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}
