//! Core traits and types for docqa
//!
//! This crate defines the types that flow through the indexing and answering
//! pipeline and the capability-facing traits (embedding, text generation) the
//! rest of the workspace programs against, keeping the pipeline test-friendly.

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod rag;
pub mod vector_store;

pub use config::{AppConfig, EmbedderKind};
pub use document::{CHUNK_INDEX_KEY, Chunk, ChunkingConfig, Document, KIND_KEY, SOURCE_KEY};
pub use embedding::Embedder;
pub use error::{Error, Result};
pub use llm::{FinishReason, GenerationConfig, GenerationResult, LLMProvider};
pub use rag::{Answer, AnswerKind, FALLBACK_ANSWER, GUIDANCE_MESSAGE};
pub use vector_store::{ScoredChunk, SearchConfig, cosine_similarity};
