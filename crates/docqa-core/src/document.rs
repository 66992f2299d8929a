//! Documents and the chunks cut from them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the URL or file path a document came from.
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the document kind (`pdf`, `text`, `web`).
pub const KIND_KEY: &str = "kind";
/// Metadata key holding a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// A source document produced by the loader or the scraper.
///
/// Metadata is open-ended, but `source` is always present and `kind` is set
/// by every producer in this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document tagged with its source
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("")
    }
}

/// A bounded window of a document's text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    /// Position of the originating document in the refresh input.
    pub document_index: usize,
}

impl Chunk {
    /// Cut a chunk from `document`, inheriting its metadata
    pub fn from_document(
        document: &Document,
        document_index: usize,
        chunk_index: usize,
        content: String,
    ) -> Self {
        let mut metadata = document.metadata.clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk_index.to_string());

        Self {
            id: format!("{:x}-{}", md5::compute(document.source().as_bytes()), chunk_index),
            content,
            metadata,
            document_index,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map(String::as_str).unwrap_or("")
    }
}

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_inherits_metadata() {
        let doc = Document::new("hello world", "https://example.com/faq").with_metadata(KIND_KEY, "web");
        let chunk = Chunk::from_document(&doc, 3, 1, "world".to_string());

        assert_eq!(chunk.source(), "https://example.com/faq");
        assert_eq!(chunk.metadata.get(KIND_KEY).map(String::as_str), Some("web"));
        assert_eq!(chunk.metadata.get(CHUNK_INDEX_KEY).map(String::as_str), Some("1"));
        assert_eq!(chunk.document_index, 3);
        assert!(chunk.id.ends_with("-1"));
    }

    #[test]
    fn test_chunk_ids_are_stable_per_source() {
        let doc = Document::new("abc", "pdfs/a.pdf");
        let a = Chunk::from_document(&doc, 0, 0, "abc".to_string());
        let b = Chunk::from_document(&doc, 0, 0, "abc".to_string());
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_default_chunking_config() {
        let config = ChunkingConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
    }
}
