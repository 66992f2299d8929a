//! Query-time retrieval over a loaded index

use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use docqa_core::{Embedder, Error, Result, ScoredChunk, SearchConfig};

use crate::index::{IndexMeta, VectorIndex};

/// Read-only view over one loaded index
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    score_threshold: Option<f32>,
}

impl Retriever {
    /// Open the index persisted at `dir`. Fails instead of serving an empty
    /// index when it is missing, unreadable or built with another embedder.
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>, score_threshold: Option<f32>) -> Result<Self> {
        let index = VectorIndex::load(dir)?;
        let retriever = Self::from_index(index, embedder, score_threshold)?;
        info!(
            "📚 Loaded index from {} ({} chunks, built {})",
            dir.display(),
            retriever.index.len(),
            retriever.index.meta().built_at
        );
        Ok(retriever)
    }

    /// Wrap an in-memory index
    pub fn from_index(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        score_threshold: Option<f32>,
    ) -> Result<Self> {
        let meta = index.meta();
        if meta.embedding_model != embedder.model_id() || meta.dimension != embedder.dimension() {
            return Err(Error::IndexCorrupt(format!(
                "index was built with {} ({} dims) but the configured embedder is {} ({} dims)",
                meta.embedding_model,
                meta.dimension,
                embedder.model_id(),
                embedder.dimension()
            )));
        }

        Ok(Self {
            index: Arc::new(index),
            embedder,
            score_threshold,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        self.index.meta()
    }

    /// Up to `k` chunks most similar to `text`, best first
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(text)?;
        let hits = self.index.search(
            &embedding,
            &SearchConfig {
                top_k: k,
                score_threshold: self.score_threshold,
            },
        );

        debug!(
            "Retrieved {} chunks for {:?} (best score {:?})",
            hits.len(),
            text,
            hits.first().map(|h| h.score)
        );
        Ok(hits)
    }
}

/// Single point of access to the current retriever.
///
/// A refresh builds a complete new [`Retriever`] and swaps it in; queries
/// already holding the previous `Arc` finish against the old index.
pub struct RetrieverHandle {
    current: RwLock<Arc<Retriever>>,
}

impl RetrieverHandle {
    pub fn new(retriever: Retriever) -> Self {
        Self {
            current: RwLock::new(Arc::new(retriever)),
        }
    }

    /// Snapshot of the retriever in use right now
    pub fn current(&self) -> Result<Arc<Retriever>> {
        let guard = self
            .current
            .read()
            .map_err(|e| Error::Other(format!("Lock error: {}", e)))?;
        Ok(Arc::clone(&guard))
    }

    /// Replace the retriever; returns the one it superseded
    pub fn replace(&self, retriever: Retriever) -> Result<Arc<Retriever>> {
        let mut guard = self
            .current
            .write()
            .map_err(|e| Error::Other(format!("Lock error: {}", e)))?;
        Ok(std::mem::replace(&mut *guard, Arc::new(retriever)))
    }
}
