//! Local language model runtime for docqa
//!
//! Runs a quantized GGUF llama (TinyLlama chat by default) in-process with
//! candle and exposes it through the `LLMProvider` trait.

mod client;
mod config;
mod fetch;


pub use client::LocalLlama;
pub use config::{DEFAULT_MODEL_URL, DEFAULT_TOKENIZER_REPO, LlamaConfig};
pub use fetch::{download, ensure_model};

// Re-export core types for convenience
pub use docqa_core::{Error, FinishReason, GenerationConfig, GenerationResult, LLMProvider, Result};
