//! Detection of repeated or near-duplicate output.

use std::collections::HashSet;

use theater_core::util::normalize;

use crate::history::BoundedBuffer;

/// Flags a candidate response that matches, exactly or by token overlap,
/// one of the most recent outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepetitionGuard {
    /// How many of the newest outputs are compared.
    pub window: usize,
    /// Overlap ratio above which a candidate counts as repetitive.
    pub threshold: f64,
}

impl Default for RepetitionGuard {
    fn default() -> Self {
        Self {
            window: 3,
            threshold: 0.7,
        }
    }
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// `|a ∩ b| / max(|a|, |b|)` over case-folded whitespace tokens.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "token counts are small")]
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let a = token_set(a);
    let b = token_set(b);
    let largest = a.len().max(b.len());
    if largest == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / largest as f64
}

impl RepetitionGuard {
    #[must_use]
    pub const fn new(window: usize, threshold: f64) -> Self {
        Self { window, threshold }
    }

    #[must_use]
    pub fn is_repetitive(&self, recent: &BoundedBuffer<String>, candidate: &str) -> bool {
        let normalized = normalize(candidate);
        recent.last_n(self.window).any(|past| {
            normalize(past) == normalized || overlap_ratio(candidate, past) > self.threshold
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recent(items: &[&str]) -> BoundedBuffer<String> {
        let mut buffer = BoundedBuffer::new(8);
        for item in items {
            buffer.push((*item).to_string());
        }
        buffer
    }

    #[test]
    fn exact_match_after_normalization() {
        let recent = recent(&["The sky is blue today.", "I like apples.", "I like apples."]);
        assert!(RepetitionGuard::default().is_repetitive(&recent, "i like apples."));
        assert!(RepetitionGuard::default().is_repetitive(&recent, "  I LIKE APPLES.  "));
    }

    #[test]
    fn high_overlap_is_repetitive() {
        let past = "one two three four five six seven eight nine ten";
        let candidate = "one two three four five six seven eight alpha beta";
        assert!((overlap_ratio(candidate, past) - 0.8).abs() < f64::EPSILON);
        assert!(RepetitionGuard::default().is_repetitive(&recent(&[past]), candidate));
    }

    #[test]
    fn half_overlap_is_not_repetitive() {
        let past = "one two three four five six seven eight nine ten";
        let candidate = "one two three four five alpha beta gamma delta epsilon";
        assert!((overlap_ratio(candidate, past) - 0.5).abs() < f64::EPSILON);
        assert!(!RepetitionGuard::default().is_repetitive(&recent(&[past]), candidate));
    }

    #[test]
    fn ratio_exactly_at_threshold_is_not_repetitive() {
        let past = "a b c d e f g h i j";
        let candidate = "a b c d e f g x y z";
        assert!((overlap_ratio(candidate, past) - 0.7).abs() < 1e-9);
        assert!(!RepetitionGuard::default().is_repetitive(&recent(&[past]), candidate));
    }

    #[test]
    fn only_the_window_is_compared() {
        let recent = recent(&["I like apples.", "first", "second", "third"]);
        assert!(!RepetitionGuard::default().is_repetitive(&recent, "I like apples."));
        assert!(RepetitionGuard::new(4, 0.7).is_repetitive(&recent, "I like apples."));
    }

    #[test]
    fn empty_history_never_repeats() {
        assert!(!RepetitionGuard::default().is_repetitive(&recent(&[]), "anything"));
    }

    #[test]
    fn empty_texts_have_zero_overlap() {
        assert!(overlap_ratio("", "").abs() < f64::EPSILON);
    }
}
