//! Small text helpers shared by the engine and the bot layer.

/// Truncate `text` to at most `max_chars` characters, appending `…` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Case-folded, whitespace-trimmed form used for output comparison.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("안녕하세요", 2), "안녕…");
    }

    #[test]
    fn normalize_folds_case_and_trims() {
        assert_eq!(normalize("  I Like Apples. \n"), "i like apples.");
    }
}
