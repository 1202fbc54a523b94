//! Content fingerprints for the duplicate gate.
//!
//! Text is lower-cased, split on whitespace, truncated to the first
//! `window` tokens and re-joined with single spaces before hashing, so
//! reflowed or re-cased copies of the same complaint collide.

use sha2::{Digest, Sha256};

/// Lower-cased, whitespace-normalised first `window` tokens of `text`.
pub fn normalized_window(text: &str, window: usize) -> String {
    text.split_whitespace()
        .take(window)
        .map(|token| token.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of [`normalized_window`].
pub fn fingerprint(text: &str, window: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_window(text, window).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_case_do_not_matter() {
        let a = fingerprint("The app  CRASHES\n every\ttime", 120);
        let b = fingerprint("the app crashes every time", 120);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn only_the_window_is_hashed() {
        let prefix = (0..120).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let a = fingerprint(&format!("{prefix} tail one"), 120);
        let b = fingerprint(&format!("{prefix} a completely different tail"), 120);
        assert_eq!(a, b);
    }

    #[test]
    fn different_windows_differ() {
        assert_ne!(
            fingerprint("battery drains overnight", 120),
            fingerprint("battery drains in an hour", 120)
        );
    }

    #[test]
    fn smaller_window_truncates() {
        assert_eq!(normalized_window("One Two Three Four", 2), "one two");
        assert_eq!(normalized_window("   ", 5), "");
    }
}
