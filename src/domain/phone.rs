//! Phone number normalization
//!
//! All phones are stored in canonical 10-digit domestic form so lookups
//! match regardless of how the customer typed their number.

/// Normalize a phone number to its 10-digit domestic form.
///
/// Strips every non-digit character, drops a leading "91" country code when
/// the result is 12 digits, and keeps the last 10 digits when longer still.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 12 && digits.starts_with("91") {
        digits[2..].to_string()
    } else if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

/// A phone is acceptable at intake when it carries 10 to 12 digits.
pub fn is_valid_phone(raw: &str) -> bool {
    let count = raw.chars().filter(|c| c.is_ascii_digit()).count();
    (10..=12).contains(&count)
}
