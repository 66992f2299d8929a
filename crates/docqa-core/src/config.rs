//! Application configuration

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rag::{FALLBACK_ANSWER, GUIDANCE_MESSAGE};
use crate::{ChunkingConfig, Error, Result, SearchConfig};

/// Which embedding backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// all-MiniLM-L6-v2 through candle
    MiniLm,
    /// Hashed bag-of-words, no model download
    Hash,
}

impl FromStr for EmbedderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "minilm" | "bert" => Ok(EmbedderKind::MiniLm),
            "hash" | "fake" => Ok(EmbedderKind::Hash),
            other => Err(Error::Configuration(format!(
                "unknown embedder '{}', expected 'minilm' or 'hash'",
                other
            ))),
        }
    }
}

/// Configuration for the indexing and answering pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub pdf_dir: PathBuf,
    pub urls_file: PathBuf,
    pub index_dir: PathBuf,
    pub static_dir: PathBuf,
    pub embedder: EmbedderKind,
    pub embedding_model: String,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub max_context_chars: usize,
    pub max_tokens: u32,
    pub fetch_timeout_secs: u64,
    pub fallback_answer: String,
    pub guidance_message: String,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pdf_dir: PathBuf::from("./pdfs"),
            urls_file: PathBuf::from("./urls.txt"),
            index_dir: PathBuf::from("./vector_index"),
            static_dir: PathBuf::from("./static"),
            embedder: EmbedderKind::MiniLm,
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            max_context_chars: 1200,
            max_tokens: 2000,
            fetch_timeout_secs: 10,
            fallback_answer: FALLBACK_ANSWER.to_string(),
            guidance_message: GUIDANCE_MESSAGE.to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl AppConfig {
    /// Create configuration from `.env` and `DOCQA_*` environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("DOCQA_PDF_DIR") {
            config.pdf_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_URLS_FILE") {
            config.urls_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_INDEX_DIR") {
            config.index_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_STATIC_DIR") {
            config.static_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_EMBEDDER") {
            config.embedder = v.parse()?;
        }
        if let Some(v) = lookup("DOCQA_EMBEDDING_MODEL") {
            config.embedding_model = v;
        }
        if let Some(v) = lookup("DOCQA_FALLBACK_ANSWER") {
            config.fallback_answer = v;
        }
        if let Some(v) = lookup("DOCQA_BIND_ADDR") {
            config.bind_addr = v;
        }

        parse_into(&lookup, "DOCQA_CHUNK_SIZE", &mut config.chunking.chunk_size)?;
        parse_into(&lookup, "DOCQA_CHUNK_OVERLAP", &mut config.chunking.chunk_overlap)?;
        parse_into(&lookup, "DOCQA_TOP_K", &mut config.search.top_k)?;
        parse_into(&lookup, "DOCQA_MAX_CONTEXT_CHARS", &mut config.max_context_chars)?;
        parse_into(&lookup, "DOCQA_MAX_TOKENS", &mut config.max_tokens)?;
        parse_into(&lookup, "DOCQA_FETCH_TIMEOUT_SECS", &mut config.fetch_timeout_secs)?;

        if let Some(v) = lookup("DOCQA_MIN_SCORE") {
            config.search.score_threshold = if v.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_value("DOCQA_MIN_SCORE", &v)?)
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.search.top_k == 0 {
            return Err(Error::Configuration("DOCQA_TOP_K must be at least 1".to_string()));
        }
        if self.max_context_chars == 0 {
            return Err(Error::Configuration(
                "DOCQA_MAX_CONTEXT_CHARS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = parse_value(key, &raw)?;
    }
    Ok(())
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} has an invalid value: '{}'", key, raw)))
}
