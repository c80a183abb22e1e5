use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Repository-relative path of the originating file.
    pub source: String,
    pub content_type: String,
    pub extra: HashMap<String, String>,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new(source: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_type: content_type.into(),
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
    /// Offset of the first character of this chunk in the document, in characters.
    pub start_offset: usize,
}
