//! Text cleaning applied to retrieved snippets before they enter a prompt.

use regex::Regex;
use std::sync::LazyLock;

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f\x7f-\x9f]").expect("valid control char regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z][A-Za-z0-9+.\-]*://(?:[A-Za-z0-9!$-_@.&+*(),]|%[0-9A-Fa-f]{2})+")
        .expect("valid url regex")
});

/// Clean a snippet: drop control characters, collapse whitespace runs,
/// strip tags, then strip `scheme://...` substrings.
///
/// The steps run in that order. Tag and URL removal are deliberately crude;
/// nothing is parsed.
pub fn sanitize(text: &str) -> String {
    let text = CONTROL_CHARS.replace_all(text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = HTML_TAG.replace_all(&text, "");
    URL.replace_all(&text, "").into_owned()
}

/// Number of characters (not bytes) in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Keep at most `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_control_characters() {
        assert_eq!(sanitize("a\u{0000}b\u{0007}c\u{0085}d"), "abcd");
        // Newlines and tabs are control characters too and vanish before collapsing.
        assert_eq!(sanitize("line\nbreak\ttab"), "linebreaktab");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize("a   b \u{3000} c"), "a b c");
    }

    #[test]
    fn test_strips_tags() {
        assert_eq!(sanitize("<p>校歌</p><br/>歌詞"), "校歌歌詞");
    }

    #[test]
    fn test_strips_urls() {
        assert_eq!(sanitize("見https://example.com/a?b=1&c=%20d網站"), "見網站");
        assert_eq!(sanitize("ftp://files.example.org/x 檔案"), " 檔案");
    }

    #[test]
    fn test_each_step_is_stable_on_clean_text() {
        let clean = "光華國小的校歌是虎山雄風飛揚";
        assert_eq!(sanitize(clean), clean);
        assert_eq!(sanitize(&sanitize(clean)), clean);
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("校歌歌詞", 2), "校歌");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
        assert_eq!(char_len("校歌"), 2);
    }
}
