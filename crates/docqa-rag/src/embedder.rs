//! Embedding backends

use std::path::PathBuf;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::info;

use docqa_core::{AppConfig, EmbedderKind, Embedder, Error, Result};

/// Maximum tokens fed to the sentence encoder; longer input is truncated.
const MAX_SEQ_LEN: usize = 256;

/// Build the embedder selected by the configuration
pub fn embedder_from_config(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedder {
        EmbedderKind::Hash => {
            info!("🧪 Using hash embedder");
            Ok(Arc::new(HashEmbedder::default()))
        }
        EmbedderKind::MiniLm => Ok(Arc::new(MiniLmEmbedder::from_hub(&config.embedding_model)?)),
    }
}

fn embed_err(e: impl std::fmt::Display) -> Error {
    Error::Embedding(e.to_string())
}

/// Deterministic hashed bag-of-words embedding.
///
/// Words and adjacent-word bigrams are hashed into a fixed number of
/// buckets and the result is L2-normalised. Texts sharing vocabulary score
/// high; unrelated texts score near zero. No model download needed.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub const MODEL_ID: &'static str = "hash-bow-v2";

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// First 8 bytes of the token's md5, stable across builds and platforms
    fn bucket(&self, token: &str) -> u64 {
        let digest = md5::compute(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.0[..8]);
        u64::from_le_bytes(bytes)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .collect();

        let dim = self.dimension as u64;
        let mut embedding = vec![0.0f32; self.dimension];

        for word in &words {
            let hash = self.bucket(word);
            embedding[(hash % dim) as usize] += 1.0;
            embedding[((hash >> 16) % dim) as usize] += 0.7;
            embedding[((hash >> 32) % dim) as usize] += 0.5;
        }

        for pair in words.windows(2) {
            let hash = self.bucket(&format!("{} {}", pair[0], pair[1]));
            embedding[(hash % dim) as usize] += 0.8;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in embedding.iter_mut() {
                *val /= magnitude;
            }
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        Self::MODEL_ID
    }
}

/// Sentence embeddings from a BERT-family model (all-MiniLM-L6-v2 by
/// default): masked mean pooling, L2-normalised.
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
}

impl MiniLmEmbedder {
    /// Download (or reuse the cached copy of) `repo_id` from the Hugging Face hub
    pub fn from_hub(repo_id: &str) -> Result<Self> {
        info!("🔄 Loading embedding model {}", repo_id);
        let api = hf_hub::api::sync::Api::new().map_err(embed_err)?;
        let repo = api.model(repo_id.to_string());

        let config_path = repo.get("config.json").map_err(embed_err)?;
        let tokenizer_path = repo.get("tokenizer.json").map_err(embed_err)?;
        let weights_path = repo.get("model.safetensors").map_err(embed_err)?;

        Self::from_files(repo_id, config_path, tokenizer_path, weights_path)
    }

    /// Load from local files
    pub fn from_files(
        model_id: &str,
        config_path: PathBuf,
        tokenizer_path: PathBuf,
        weights_path: PathBuf,
    ) -> Result<Self> {
        let device = Device::Cpu;

        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::Embedding(format!(
                "failed to load tokenizer from {}: {}",
                tokenizer_path.display(),
                e
            ))
        })?;

        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device) }
            .map_err(embed_err)?;
        let model = BertModel::load(vb, &config).map_err(embed_err)?;

        let mut embedder = Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            dimension: 0,
        };
        embedder.dimension = embedder.forward("dimension probe").map_err(embed_err)?.len();

        info!("✅ Embedding model {} loaded ({} dims)", model_id, embedder.dimension);
        Ok(embedder)
    }

    fn forward(&self, text: &str) -> candle_core::Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| candle_core::Error::Msg(format!("tokenization failed: {}", e)))?;

        let mut ids = encoding.get_ids().to_vec();
        let mut mask = encoding.get_attention_mask().to_vec();
        ids.truncate(MAX_SEQ_LEN);
        mask.truncate(MAX_SEQ_LEN);

        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(mask.as_slice(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        pooled.squeeze(0)?.to_dtype(DType::F32)?.to_vec1()
    }
}

impl Embedder for MiniLmEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.forward(text).map_err(embed_err)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Mean of the hidden states over unmasked positions, then L2 normalisation.
/// `hidden` is `[batch, tokens, dim]`, `attention_mask` is `[batch, tokens]`.
fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?;
    let masked = hidden.broadcast_mul(&mask.unsqueeze(2)?)?;
    let sum = masked.sum(1)?;
    let lengths = mask.sum_keepdim(1)?.maximum(1e-9)?;
    let mean = sum.broadcast_div(&lengths)?;
    let norm = mean.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(1e-12)?;
    mean.broadcast_div(&norm)
}
