//! Persisted vector index
//!
//! On disk an index is a directory with two files:
//! - `meta.json`: format version, embedding model, dimension, chunk count, build time
//! - `entries.json`: every chunk with its embedding
//!
//! [`VectorIndex::save`] writes a complete sibling directory first and only
//! then swaps it into place, so a reader never sees a half-written index.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use docqa_core::{Chunk, Error, Result, ScoredChunk, SearchConfig, cosine_similarity};

pub const FORMAT_VERSION: u32 = 1;
const META_FILE: &str = "meta.json";
const ENTRIES_FILE: &str = "entries.json";

/// Index-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

/// A chunk and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Immutable in-memory vector index with exact cosine search
#[derive(Debug, Clone)]
pub struct VectorIndex {
    meta: IndexMeta,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from embedded chunks; every embedding must have `dimension` entries
    pub fn new(embedding_model: &str, dimension: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(Error::Embedding(format!(
                "chunk {} has {} dimensions, expected {}",
                bad.chunk.id,
                bad.embedding.len(),
                dimension
            )));
        }

        Ok(Self {
            meta: IndexMeta {
                format_version: FORMAT_VERSION,
                embedding_model: embedding_model.to_string(),
                dimension,
                chunk_count: entries.len(),
                built_at: Utc::now(),
            },
            entries,
        })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `config.top_k` chunks by descending cosine similarity, dropping
    /// hits under the score threshold
    pub fn search(&self, query: &[f32], config: &SearchConfig) -> Vec<ScoredChunk> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), entry))
            .filter(|(score, _)| config.score_threshold.is_none_or(|min| *score >= min))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(config.top_k);

        scored
            .into_iter()
            .map(|(score, entry)| ScoredChunk {
                chunk: entry.chunk.clone(),
                score,
            })
            .collect()
    }

    /// Persist to `dir`, replacing whatever is there only once the new copy is complete
    pub fn save(&self, dir: &Path) -> Result<()> {
        let parent = dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let name = dir
            .file_name()
            .ok_or_else(|| Error::Configuration(format!("invalid index path: {}", dir.display())))?
            .to_string_lossy()
            .into_owned();
        let staging = parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4()));

        if let Err(e) = self.write_files(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        swap_into_place(&staging, dir, parent, &name)?;
        info!("💾 Saved index with {} chunks to {}", self.len(), dir.display());
        Ok(())
    }

    fn write_files(&self, staging: &Path) -> Result<()> {
        std::fs::create_dir_all(staging)?;
        std::fs::write(staging.join(ENTRIES_FILE), serde_json::to_vec(&self.entries)?)?;
        // meta last: a directory without it is never treated as an index
        std::fs::write(staging.join(META_FILE), serde_json::to_vec_pretty(&self.meta)?)?;
        Ok(())
    }

    /// Load an index; absent → `IndexNotFound`, unreadable or inconsistent → `IndexCorrupt`.
    ///
    /// While [`VectorIndex::save`] swaps directories the target is briefly
    /// absent; the previous index is then read from its retired copy.
    pub fn load(dir: &Path) -> Result<Self> {
        match Self::load_dir(dir) {
            Err(Error::IndexNotFound(_)) => {
                if let Some(retired) = retired_sibling(dir) {
                    if let Ok(index) = Self::load_dir(&retired) {
                        debug!("Read index from {} during a swap", retired.display());
                        return Ok(index);
                    }
                }
                // the swap may have finished in the meantime
                Self::load_dir(dir)
            }
            other => other,
        }
    }

    fn load_dir(dir: &Path) -> Result<Self> {
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(Error::IndexNotFound(dir.to_path_buf()));
        }

        let meta: IndexMeta = read_json(&meta_path)?;
        if meta.format_version != FORMAT_VERSION {
            return Err(Error::IndexCorrupt(format!(
                "unsupported format version {} (expected {})",
                meta.format_version, FORMAT_VERSION
            )));
        }

        let entries: Vec<IndexEntry> = read_json(&dir.join(ENTRIES_FILE))?;
        if entries.len() != meta.chunk_count {
            return Err(Error::IndexCorrupt(format!(
                "meta lists {} chunks but {} entries were found",
                meta.chunk_count,
                entries.len()
            )));
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != meta.dimension) {
            return Err(Error::IndexCorrupt(format!(
                "chunk {} has {} dimensions, expected {}",
                bad.chunk.id,
                bad.embedding.len(),
                meta.dimension
            )));
        }

        debug!("Loaded {} entries from {}", entries.len(), dir.display());
        Ok(Self { meta, entries })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| Error::IndexCorrupt(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::IndexCorrupt(format!("cannot parse {}: {}", path.display(), e)))
}

/// Directory an in-flight [`swap_into_place`] moved the previous index to
fn retired_sibling(dir: &Path) -> Option<PathBuf> {
    let parent = dir.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let prefix = format!(".{}.old-", dir.file_name()?.to_string_lossy());

    std::fs::read_dir(parent)
        .ok()?
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
        .map(|entry| entry.path())
}

/// Remove a retired index. The new index is already in place, so a failure
/// only leaves a stray directory behind.
fn discard_retired(retired: &Path) -> bool {
    match std::fs::remove_dir_all(retired) {
        Ok(()) => true,
        Err(e) => {
            warn!("⚠️  Could not remove old index {}: {}", retired.display(), e);
            false
        }
    }
}

/// Rename `staging` to `target`. An existing target is first moved aside and
/// removed after the swap; if the final rename fails it is put back.
fn swap_into_place(staging: &Path, target: &Path, parent: &Path, name: &str) -> Result<()> {
    if !target.exists() {
        return std::fs::rename(staging, target).map_err(Error::from);
    }

    let retired: PathBuf = parent.join(format!(".{}.old-{}", name, Uuid::new_v4()));
    std::fs::rename(target, &retired)?;

    if let Err(e) = std::fs::rename(staging, target) {
        let _ = std::fs::rename(&retired, target);
        let _ = std::fs::remove_dir_all(staging);
        return Err(e.into());
    }

    discard_retired(&retired);
    Ok(())
}
