//! Human-readable order numbers

use chrono::{DateTime, Utc};
use rand::Rng;

const SUFFIX_LEN: usize = 6;
const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate an order number: `{prefix}-{YYYYMMDD}-{random suffix}`.
///
/// URL-safe by construction. Uniqueness is enforced by the database; callers
/// retry with a fresh suffix on collision.
pub fn generate(prefix: &str, now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_shape() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let n = generate("LW", now);
        assert!(n.starts_with("LW-20260314-"));
        assert_eq!(n.len(), "LW-20260314-".len() + SUFFIX_LEN);
    }

    #[test]
    fn test_url_safe() {
        let n = generate("LW", Utc::now());
        assert!(n.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_suffix_varies() {
        let now = Utc::now();
        let a = generate("LW", now);
        let b = generate("LW", now);
        // Six characters over a 31-symbol alphabet; a collision here would
        // be a broken RNG, not bad luck.
        assert_ne!(a, b);
    }
}
