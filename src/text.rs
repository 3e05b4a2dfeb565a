//! Plain-text extraction and boundary-aware truncation, shared by the feed
//! fetcher and the AI client.

const SNIPPET_MAX_CHARS: usize = 200;

/// Strips HTML to entity-decoded plain text with whitespace collapsed to
/// single spaces. Returns None when nothing readable survives.
pub fn clean_html(html: &str) -> Option<String> {
    let text = html2text::from_read(html.as_bytes(), 80).ok()?;
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Cuts a display snippet at 200 characters, preferring a sentence end past
/// 70% of the cap, then a word boundary. `...` is appended unless the cut
/// landed on a sentence end.
pub fn make_snippet(text: &str) -> String {
    let prefix = char_prefix(text, SNIPPET_MAX_CHARS);
    if prefix.len() == text.len() {
        return text.to_string();
    }

    if let Some(pos) = prefix.rfind('.') {
        let cut = &prefix[..=pos];
        if cut.chars().count() >= SNIPPET_MAX_CHARS * 7 / 10 {
            return cut.to_string();
        }
    }

    if let Some(pos) = prefix.rfind(char::is_whitespace) {
        return format!("{}...", prefix[..pos].trim_end());
    }

    format!("{prefix}...")
}

/// Truncates to at most `max_chars`, preferring a sentence end past 70% of
/// the cap, then a paragraph break past 50%, then a word boundary, then a
/// hard cut.
pub fn truncate_at_boundary(text: &str, max_chars: usize) -> String {
    let prefix = char_prefix(text, max_chars);
    if prefix.len() == text.len() {
        return text.to_string();
    }

    if let Some(pos) = prefix.rfind('.') {
        let cut = &prefix[..=pos];
        if cut.chars().count() >= max_chars * 7 / 10 {
            return cut.to_string();
        }
    }

    if let Some(pos) = prefix.rfind("\n\n") {
        let cut = &prefix[..pos];
        if cut.chars().count() >= max_chars / 2 {
            return cut.trim_end().to_string();
        }
    }

    if let Some(pos) = prefix.rfind(char::is_whitespace) {
        return prefix[..pos].trim_end().to_string();
    }

    prefix.to_string()
}

/// The longest prefix holding at most `max_chars` characters, ending on a
/// char boundary.
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_html_strips_tags_and_decodes_entities() {
        let cleaned = clean_html("<p>Fish &amp; chips,\n   twice</p>").unwrap();
        assert_eq!(cleaned, "Fish & chips, twice");
    }

    #[test]
    fn clean_html_returns_none_for_empty_markup() {
        assert!(clean_html("<div>   </div>").is_none());
    }

    #[test]
    fn short_text_passes_through_untouched() {
        assert_eq!(make_snippet("A short one."), "A short one.");
        assert_eq!(truncate_at_boundary("tiny", 2000), "tiny");
    }

    #[test]
    fn snippet_cuts_at_late_sentence_end_without_ellipsis() {
        // Sentence end at 180 chars, past 70% of the 200 cap.
        let sentence = format!("{}.", "a".repeat(179));
        let text = format!("{sentence} {}", "b".repeat(100));
        let snippet = make_snippet(&text);
        assert_eq!(snippet, sentence);
        assert!(!snippet.ends_with("..."));
    }

    #[test]
    fn snippet_falls_back_to_word_boundary_with_ellipsis() {
        let words = "word ".repeat(30).trim_end().to_string();
        let text = format!("{words} {}", "c".repeat(150));
        assert_eq!(make_snippet(&text), format!("{words}..."));
    }

    #[test]
    fn snippet_hard_cuts_unbroken_text() {
        let text = "x".repeat(500);
        let snippet = make_snippet(&text);
        assert_eq!(snippet, format!("{}...", "x".repeat(200)));
    }

    #[test]
    fn truncation_prefers_sentence_end_past_threshold() {
        // 2500 chars with the last sentence end at char 1800 (> 70% of 2000).
        let sentence = format!("{}.", "a".repeat(1799));
        let text = format!("{sentence}{}", " b".repeat(350));
        let cut = truncate_at_boundary(&text, 2000);
        assert_eq!(cut, sentence);
        assert_eq!(cut.chars().count(), 1800);
    }

    #[test]
    fn truncation_falls_back_to_paragraph_break() {
        // No sentence end; paragraph break at char 1500 (> 50% of 2000).
        let text = format!("{}\n\n{}", "a".repeat(1500), "b".repeat(1000));
        let cut = truncate_at_boundary(&text, 2000);
        assert_eq!(cut, "a".repeat(1500));
    }

    #[test]
    fn truncation_falls_back_to_word_boundary() {
        let text = format!("{} {}", "word ".repeat(300).trim_end(), "tail".repeat(200));
        let cut = truncate_at_boundary(&text, 2000);
        assert!(cut.chars().count() <= 2000);
        assert!(!cut.ends_with(char::is_whitespace));
    }

    #[test]
    fn truncation_hard_cuts_as_last_resort() {
        let text = "y".repeat(3000);
        assert_eq!(truncate_at_boundary(&text, 2000), "y".repeat(2000));
    }
}
