//! Embedding trait

use crate::Result;

/// Turns text into a fixed-length vector.
///
/// Embedding is CPU-bound and synchronous; async callers should move it to
/// the blocking pool.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize;

    /// Identifier recorded in the index so a retriever can refuse an index
    /// built with a different model.
    fn model_id(&self) -> &str;
}
