use crate::error::IngestError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SENTENCE_END: &str = r"[.!?]\s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits text into overlapping windows, preferring paragraph, line, sentence
/// and word boundaries before cutting inside a word.
///
/// Every chunk is a verbatim slice of the input, so the chunks taken together
/// (minus their overlaps) give back the original text.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
    sentence_end: Regex,
}

/// A page of text indexed by character position.
struct CharView<'a> {
    text: &'a str,
    chars: Vec<char>,
    // byte offset of every char, plus text.len() at the end
    offsets: Vec<usize>,
}

impl<'a> CharView<'a> {
    fn new(text: &'a str) -> Self {
        let (offsets, chars): (Vec<usize>, Vec<char>) = text.char_indices().unzip();
        let mut offsets = offsets;
        offsets.push(text.len());
        Self {
            text,
            chars,
            offsets,
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn slice(&self, range: Range<usize>) -> &'a str {
        &self.text[self.offsets[range.start]..self.offsets[range.end]]
    }

    fn char_index(&self, byte: usize) -> Option<usize> {
        self.offsets.binary_search(&byte).ok()
    }
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            sentence_end: Regex::new(SENTENCE_END)?,
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let view = CharView::new(text);
        self.spans_of(&view)
            .into_iter()
            .map(|span| view.slice(span).to_string())
            .collect()
    }

    /// Character ranges of the chunks `split` would return.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.spans_of(&CharView::new(text))
    }

    fn spans_of(&self, view: &CharView<'_>) -> Vec<Range<usize>> {
        let total = view.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            let limit = (start + self.config.chunk_size).min(total);
            if limit == total {
                spans.push(start..total);
                break;
            }

            let end = self.find_break(view, start, limit);
            spans.push(start..end);
            start = self.next_start(view, start, end);
        }

        spans
    }

    /// Picks the end of the chunk starting at `start`, no further than `limit`.
    fn find_break(&self, view: &CharView<'_>, start: usize, limit: usize) -> usize {
        let floor = start + self.config.chunk_overlap;
        let base = view.offsets[start];
        let window = view.slice(start..limit);

        let candidates = [
            window.rfind("\n\n").map(|pos| pos + 2),
            window.rfind('\n').map(|pos| pos + 1),
            self.sentence_end.find_iter(window).last().map(|m| m.end()),
            window
                .char_indices()
                .rev()
                .find(|(_, ch)| ch.is_whitespace())
                .map(|(pos, ch)| pos + ch.len_utf8()),
        ];

        candidates
            .into_iter()
            .flatten()
            .filter_map(|pos| view.char_index(base + pos))
            .find(|end| *end > floor)
            .unwrap_or(limit)
    }

    /// Start of the chunk after `start..end`, at least `chunk_overlap`
    /// characters before `end`, pulled back to a word start when one is near.
    fn next_start(&self, view: &CharView<'_>, start: usize, end: usize) -> usize {
        let overlap = self.config.chunk_overlap;
        let candidate = end - overlap;
        let lowest = candidate.saturating_sub(overlap).max(start + 1);

        (lowest..=candidate)
            .rev()
            .find(|&index| view.chars[index - 1].is_whitespace())
            .unwrap_or(candidate)
    }
}
