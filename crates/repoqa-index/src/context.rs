//! Embedding text generation.
//!
//! A chunk is embedded together with a small header naming its file and language,
//! so that path and language words take part in similarity search.

use repoqa_memory::document::Chunk;

#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.content.len() + 64);
    text.push_str("# ");
    text.push_str(&chunk.metadata.source);
    text.push('\n');
    text.push_str("# Language: ");
    text.push_str(&chunk.metadata.content_type);
    text.push('\n');
    text.push_str(&chunk.content);
    text
}

#[cfg(test)]
mod tests {
    use repoqa_memory::document::DocumentMetadata;

    use super::*;

    #[test]
    fn header_precedes_content() {
        let chunk = Chunk {
            content: "def verify(token): ...".into(),
            metadata: DocumentMetadata::new("auth.py", "python"),
            chunk_index: 0,
            start_offset: 0,
        };
        assert_eq!(
            contextualize_for_embedding(&chunk),
            "# auth.py\n# Language: python\ndef verify(token): ..."
        );
    }
}
