//! Sliding-window chunking

use docqa_core::{Chunk, ChunkingConfig, Document, Error, Result};

/// Splits documents into overlapping fixed-size character windows
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker; the overlap must be smaller than the window
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(Error::Configuration(format!(
                "invalid chunking: size {} overlap {}",
                config.chunk_size, config.chunk_overlap
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Chunk every document independently, preserving document order
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .enumerate()
            .flat_map(|(doc_index, document)| {
                self.windows(&document.content)
                    .into_iter()
                    .enumerate()
                    .map(move |(i, window)| Chunk::from_document(document, doc_index, i, window))
            })
            .collect()
    }

    /// Cut `content` into windows of `chunk_size` chars, each starting
    /// `chunk_size - chunk_overlap` chars after the previous one
    fn windows(&self, content: &str) -> Vec<String> {
        let mut windows = Vec::new();
        let chars: Vec<char> = content.chars().collect();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.config.chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            if !window.trim().is_empty() {
                windows.push(window);
            }

            if end >= chars.len() {
                break;
            }

            start = end - self.config.chunk_overlap;
        }

        windows
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkingConfig::default(),
        }
    }
}
