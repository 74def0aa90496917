//! Typing statistics.
//!
//! Always computed from the latest cursor/mistake values, never
//! accumulated.

/// Characters per "word" in the WPM convention.
const CHARS_PER_WORD: f64 = 5.0;

/// Words per minute for `correct_chars` typed over `elapsed_ms`.
///
/// Zero elapsed time yields 0 rather than infinity.
pub fn words_per_minute(correct_chars: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        return 0.0;
    }
    let minutes = elapsed_ms as f64 / 60_000.0;
    (correct_chars as f64 / CHARS_PER_WORD) / minutes
}

/// Fraction of keystrokes that were correct, in `0.0..=1.0`.
///
/// With nothing typed yet accuracy is perfect (1.0).
pub fn accuracy(correct_chars: u64, mistakes: u64) -> f64 {
    let attempts = correct_chars + mistakes;
    if attempts == 0 {
        return 1.0;
    }
    correct_chars as f64 / attempts as f64
}

/// Rounds to two decimal places, halves away from zero.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wpm_zero_chars_is_zero() {
        assert_eq!(words_per_minute(0, 60_000), 0.0);
    }

    #[test]
    fn test_wpm_25_chars_in_30s_is_10() {
        assert_eq!(words_per_minute(25, 30_000), 10.0);
    }

    #[test]
    fn test_wpm_zero_elapsed_is_zero() {
        assert_eq!(words_per_minute(100, 0), 0.0);
    }

    #[test]
    fn test_accuracy_nothing_typed_is_perfect() {
        assert_eq!(accuracy(0, 0), 1.0);
    }

    #[test]
    fn test_accuracy_90_of_100() {
        assert_eq!(accuracy(90, 10), 0.9);
    }

    #[test]
    fn test_accuracy_all_mistakes_is_zero() {
        assert_eq!(accuracy(0, 4), 0.0);
    }

    #[test]
    fn test_round2_vectors() {
        assert_eq!(round2(12.344), 12.34);
        assert_eq!(round2(12.345_1), 12.35);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.0 / 3.0), 0.67);
        assert_eq!(round2(100.0 * accuracy(25, 1)), 96.15);
        assert_eq!(round2(words_per_minute(37, 7_000)), 63.43);
    }
}
