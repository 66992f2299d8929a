//! Retrieval-augmented question answering for docqa
//!
//! This crate loads and scrapes documents, chunks and embeds them into a
//! persisted vector index, and answers questions from the retrieved chunks.

pub mod builder;
pub mod chunker;
pub mod embedder;
pub mod engine;
pub mod index;
pub mod loader;
pub mod retriever;
pub mod service;
pub mod web_scraper;

#[cfg(test)]
mod tests;

pub use builder::{IndexBuilder, RefreshReport};
pub use chunker::Chunker;
pub use embedder::{HashEmbedder, MiniLmEmbedder, embedder_from_config};
pub use engine::{AnswerConfig, AnswerEngine, QUESTION_STOP, assemble_context, build_prompt};
pub use index::{IndexEntry, IndexMeta, VectorIndex};
pub use retriever::{Retriever, RetrieverHandle};
pub use service::{QaService, ServiceStats};
pub use web_scraper::{AccordionSelectors, QaPair, ScrapeReport, WebScraper, read_url_list};

// Re-export core types for convenience
pub use docqa_core::{
    Answer, AnswerKind, AppConfig, Chunk, ChunkingConfig, Document, Embedder, Error,
    GenerationConfig, GenerationResult, LLMProvider, Result, ScoredChunk, SearchConfig,
};
