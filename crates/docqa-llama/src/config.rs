//! Local model configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use docqa_core::{Error, Result};

/// TinyLlama chat, 4-bit quantized
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF/resolve/main/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf";
pub const DEFAULT_TOKENIZER_REPO: &str = "TinyLlama/TinyLlama-1.1B-Chat-v1.0";

/// Configuration for the local llama runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaConfig {
    pub model_path: PathBuf,
    pub model_url: String,
    /// Hugging Face repo holding `tokenizer.json`, or a path to the file itself
    pub tokenizer_repo: String,
    pub context_size: usize,
    /// Default temperature when a request does not set one. `None` is greedy.
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
    pub seed: u64,
}

impl Default for LlamaConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./model/tinyllama.gguf"),
            model_url: DEFAULT_MODEL_URL.to_string(),
            tokenizer_repo: DEFAULT_TOKENIZER_REPO.to_string(),
            context_size: 2048,
            temperature: None,
            top_p: None,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            seed: 299792458,
        }
    }
}

impl LlamaConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("DOCQA_MODEL_PATH") {
            config.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOCQA_MODEL_URL") {
            config.model_url = v;
        }
        if let Some(v) = lookup("DOCQA_TOKENIZER_REPO") {
            config.tokenizer_repo = v;
        }
        if let Some(v) = lookup("DOCQA_CTX_SIZE") {
            config.context_size = parse("DOCQA_CTX_SIZE", &v)?;
        }
        if let Some(v) = lookup("DOCQA_TEMPERATURE") {
            config.temperature = Some(parse("DOCQA_TEMPERATURE", &v)?);
        }
        if let Some(v) = lookup("DOCQA_TOP_P") {
            config.top_p = Some(parse("DOCQA_TOP_P", &v)?);
        }
        if let Some(v) = lookup("DOCQA_REPEAT_PENALTY") {
            config.repeat_penalty = parse("DOCQA_REPEAT_PENALTY", &v)?;
        }
        if let Some(v) = lookup("DOCQA_SEED") {
            config.seed = parse("DOCQA_SEED", &v)?;
        }

        if config.context_size < 16 {
            return Err(Error::Configuration(format!(
                "DOCQA_CTX_SIZE must be at least 16, got {}",
                config.context_size
            )));
        }

        Ok(config)
    }

    /// Name reported as the model id
    pub fn model_name(&self) -> String {
        self.model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local-llama".to_string())
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        let decoding = match (self.temperature, self.top_p) {
            (None, _) => "greedy".to_string(),
            (Some(t), None) => format!("temperature {}", t),
            (Some(t), Some(p)) => format!("temperature {} top-p {}", t, p),
        };
        format!("{} (ctx {}, {})", self.model_name(), self.context_size, decoding)
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Configuration(format!("{} has an invalid value: '{}'", key, raw)))
}
