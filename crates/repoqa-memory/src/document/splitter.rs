use super::error::DocumentError;
use super::types::{Chunk, Document};

/// Structural boundaries tried in order when choosing where a chunk ends.
const SEPARATORS: [&[char]; 3] = [&['\n', '\n'], &['\n'], &[' ']];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// Overlapping, boundary-aware character splitter.
///
/// Sizes are measured in characters, not bytes. Consecutive chunks share exactly
/// `chunk_overlap` characters, so dropping that prefix from every chunk but the
/// first and concatenating gives back the original text.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    /// # Errors
    ///
    /// Returns an error if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(config: SplitterConfig) -> Result<Self, DocumentError> {
        if config.chunk_size == 0 {
            return Err(DocumentError::ZeroChunkSize);
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(DocumentError::OverlapTooLarge {
                overlap: config.chunk_overlap,
                size: config.chunk_size,
            });
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> SplitterConfig {
        self.config
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        if document.content.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = document.content.chars().collect();
        split_spans(&chars, self.config.chunk_size, self.config.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| Chunk {
                content: chars[start..end].iter().collect(),
                metadata: document.metadata.clone(),
                chunk_index: i,
                start_offset: start,
            })
            .collect()
    }
}

fn split_spans(chars: &[char], size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        if chars.len() - start <= size {
            spans.push((start, chars.len()));
            return spans;
        }
        let hard = start + size;
        let end = last_boundary(chars, start + overlap, hard).unwrap_or(hard);
        spans.push((start, end));
        // end > start + overlap, so this always advances
        start = end - overlap;
    }
}

/// Last position in `(lo, hi]` directly after a separator, by separator priority.
fn last_boundary(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    SEPARATORS.iter().find_map(|sep| {
        (lo + 1..=hi)
            .rev()
            .find(|&end| end >= sep.len() && chars[end - sep.len()..end] == **sep)
    })
}
