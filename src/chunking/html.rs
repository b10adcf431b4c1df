//! Plain-text extraction for rich-text document content.
//!
//! Knowledge-base documents arrive as editor HTML. Chunking operates on plain
//! text, so this pass flattens markup while keeping block-element boundaries
//! as paragraph breaks; those boundaries are what the splitter's separator
//! cascade keys on. Content without markup passes through untouched.

use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, li, blockquote, pre";

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid markup pattern"))
}

fn blank_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank-line pattern"))
}

/// Extracts plain text from document content.
///
/// Returns the input unchanged when it contains no markup. Otherwise each
/// block-level element becomes one paragraph, separated by blank lines, with
/// horizontal whitespace collapsed.
pub fn extract_text(content: &str) -> String {
    if content.is_empty() || !tag_pattern().is_match(content) {
        return content.to_string();
    }

    let document = Html::parse_document(content);
    let blocks = Selector::parse(BLOCK_SELECTOR).expect("valid block selector");

    let mut paragraphs: Vec<String> = Vec::new();
    for element in document.select(&blocks) {
        // Nested blocks (a <p> inside a <blockquote>) are emitted by the
        // inner match only.
        if element.select(&blocks).next().is_some() {
            continue;
        }
        let text = collapse_whitespace(element.text());
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    // Markup without recognized block elements, e.g. bare <span> runs.
    if paragraphs.is_empty() {
        let text = collapse_whitespace(document.root_element().text());
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    let joined = paragraphs.join("\n\n");
    blank_line_pattern().replace_all(&joined, "\n\n").trim().to_string()
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        for word in part.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}
