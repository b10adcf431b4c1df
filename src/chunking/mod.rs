//! Deterministic text chunking.
//!
//! Splits a document into ordered, bounded-size chunks with contiguous
//! zero-based ordinals. Splitting is a pure function of the input text and
//! the [`ChunkerConfig`]: identical inputs always produce identical chunk
//! sequences, which is what makes fingerprint-based skip logic in the
//! ingestion pipeline meaningful.
//!
//! The splitter works down a separator cascade, preferring paragraph breaks,
//! then line breaks, then sentence punctuation (including CJK full-width
//! forms), then whitespace, and finally raw character windows for degenerate
//! input with no natural boundaries.

pub mod html;

use unicode_segmentation::UnicodeSegmentation;

/// Separator cascade, strongest boundary first.
const SEPARATORS: [&str; 9] = ["\n\n", "\n", "。", "！", "？", ". ", "! ", "? ", " "];

/// Chunking parameters.
#[derive(Clone, Debug)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters.
    pub max_characters: usize,
    /// Characters carried over from the end of the previous chunk.
    pub overlap_characters: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_characters: 1000,
            overlap_characters: 200,
        }
    }
}

impl ChunkerConfig {
    #[must_use]
    pub fn with_max_characters(mut self, max_characters: usize) -> Self {
        self.max_characters = max_characters;
        self
    }

    #[must_use]
    pub fn with_overlap_characters(mut self, overlap_characters: usize) -> Self {
        self.overlap_characters = overlap_characters;
        self
    }

    fn effective_overlap(&self) -> usize {
        // Overlap must leave room for new content in every chunk.
        self.overlap_characters.min(self.max_characters / 2)
    }
}

/// One ordered slice of a document's text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChunk {
    /// Zero-based position within the document.
    pub index: usize,
    pub content: String,
    /// Estimated token count (word segmentation).
    pub token_count: usize,
}

/// Splits document text into chunks. Stateless and side-effect free.
#[derive(Clone, Debug, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Splits `content` into ordered chunks.
    ///
    /// Rich-text markup is flattened first. Empty or whitespace-only input
    /// yields zero chunks; input within one budget yields exactly one chunk.
    pub fn chunk(&self, content: &str) -> Vec<TextChunk> {
        let text = html::extract_text(content);
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let fragments = self.split_recursive(text, &SEPARATORS);
        let assembled = self.assemble(fragments);

        assembled
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let token_count = content.unicode_words().count();
                TextChunk {
                    index,
                    content,
                    token_count,
                }
            })
            .collect()
    }

    /// Breaks text into fragments no longer than the budget, splitting on the
    /// strongest boundary available and recursing into oversize pieces.
    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let max = self.config.max_characters;
        if char_len(text) <= max {
            return vec![text.to_string()];
        }

        let Some((separator, rest)) = separators.split_first() else {
            return split_windows(text, max);
        };

        if !text.contains(separator) {
            return self.split_recursive(text, rest);
        }

        let mut fragments = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) <= max {
                fragments.push(piece);
            } else {
                fragments.extend(self.split_recursive(&piece, rest));
            }
        }
        fragments
    }

    /// Greedily packs fragments into budget-sized chunks, seeding each chunk
    /// after the first with the overlap tail of its predecessor.
    fn assemble(&self, fragments: Vec<String>) -> Vec<String> {
        let max = self.config.max_characters;
        let overlap = self.config.effective_overlap();

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for fragment in fragments {
            if !current.is_empty() && char_len(&current) + char_len(&fragment) > max {
                let finished = std::mem::take(&mut current);
                if overlap > 0 {
                    let tail = tail_chars(&finished, overlap);
                    if char_len(tail) + char_len(&fragment) <= max {
                        current.push_str(tail);
                    }
                }
                chunks.push(finished);
            }
            current.push_str(&fragment);
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits on `separator`, keeping the separator attached to the preceding
/// piece so reassembly never loses characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(separator) {
        let end = pos + separator.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Last-resort fixed windows for text with no usable boundary.
fn split_windows(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max.max(1))
        .map(|window| window.iter().collect())
        .collect()
}

/// Returns the suffix of `text` covering at most `count` characters.
fn tail_chars(text: &str, count: usize) -> &str {
    let total = char_len(text);
    if total <= count {
        return text;
    }
    let skip = total - count;
    match text.char_indices().nth(skip) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => "",
    }
}
