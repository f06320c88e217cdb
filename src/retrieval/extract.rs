//! Plain text extraction from fetched HTML and the encoding filter.

use scraper::Html;

/// Elements whose text never reaches a snippet.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Encoding classification of extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedEncoding {
    /// Only 7-bit characters.
    Ascii,
    /// Contains multi-byte UTF-8 sequences.
    Utf8,
}

/// Classify extracted text. Pages are decoded to `&str` upstream, so text is
/// always valid UTF-8 here; the question is whether it is plain ASCII.
pub fn detect_encoding(text: &str) -> DetectedEncoding {
    if text.is_ascii() {
        DetectedEncoding::Ascii
    } else {
        DetectedEncoding::Utf8
    }
}

/// Concatenate the document's visible text with every whitespace run removed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::new();

    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };

        let skipped = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .map(|element| SKIPPED_ELEMENTS.contains(&element.name()))
            .unwrap_or(false);

        if !skipped {
            text.extend(fragment.split_whitespace());
        }
    }

    text
}

/// Extract a snippet from a page, keeping it only when it is UTF-8 text.
pub fn extract_snippet(html: &str) -> Option<String> {
    let text = html_to_text(html);
    match detect_encoding(&text) {
        DetectedEncoding::Utf8 => Some(text),
        DetectedEncoding::Ascii => None,
    }
}
