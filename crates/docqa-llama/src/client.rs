//! In-process quantized llama

use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docqa_core::{Error, FinishReason, GenerationConfig, GenerationResult, LLMProvider, Result};

use crate::config::LlamaConfig;

const EOS_TOKEN: &str = "</s>";

fn llm_err(e: impl Display) -> Error {
    Error::LLMProvider(e.to_string())
}

/// GGUF llama model running on candle
pub struct LocalLlama {
    model: Arc<Mutex<ModelWeights>>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    eos_token: Option<u32>,
    config: LlamaConfig,
    model_id: String,
}

impl LocalLlama {
    /// Load weights from `config.model_path` and the matching tokenizer.
    /// The weights must already be on disk; see [`crate::ensure_model`].
    pub fn load(config: LlamaConfig) -> Result<Self> {
        let path = &config.model_path;
        let mut file = std::fs::File::open(path)
            .map_err(|e| Error::LLMProvider(format!("cannot open model {}: {}", path.display(), e)))?;

        let device = Device::cuda_if_available(0).map_err(llm_err)?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| Error::LLMProvider(format!("invalid GGUF file {}: {}", path.display(), e)))?;
        let model = ModelWeights::from_gguf(content, &mut file, &device).map_err(llm_err)?;

        let tokenizer = load_tokenizer(&config.tokenizer_repo)?;
        let eos_token = tokenizer.token_to_id(EOS_TOKEN);

        info!("🦙 Loaded {} on {:?}", config.summary(), device);

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer: Arc::new(tokenizer),
            device,
            eos_token,
            model_id: config.model_name(),
            config,
        })
    }

    pub fn config(&self) -> &LlamaConfig {
        &self.config
    }
}

fn load_tokenizer(repo: &str) -> Result<Tokenizer> {
    let local = Path::new(repo);
    let path = if local.is_file() {
        local.to_path_buf()
    } else {
        hf_hub::api::sync::Api::new()
            .and_then(|api| api.model(repo.to_string()).get("tokenizer.json"))
            .map_err(|e| Error::LLMProvider(format!("cannot fetch tokenizer from {}: {}", repo, e)))?
    };
    Tokenizer::from_file(&path).map_err(llm_err)
}

/// Decoding strategy for one request. Request settings win over the
/// configured defaults.
pub(crate) fn sampling(request: &GenerationConfig, defaults: &LlamaConfig) -> Sampling {
    let temperature = request.temperature.map(f64::from).or(defaults.temperature);
    let top_p = request.top_p.map(f64::from).or(defaults.top_p);

    match (temperature, top_p) {
        (Some(temperature), _) if temperature <= 0.0 => Sampling::ArgMax,
        (None, _) => Sampling::ArgMax,
        (Some(temperature), None) => Sampling::All { temperature },
        (Some(temperature), Some(p)) => Sampling::TopP { p, temperature },
    }
}

/// Repeat penalty for one request, falling back to the configured default
pub(crate) fn repeat_penalty(request: &GenerationConfig, defaults: &LlamaConfig) -> f32 {
    request.repeat_penalty.unwrap_or(defaults.repeat_penalty)
}

/// Keep the tail of `tokens` so that some room is left for generation
pub(crate) fn fit_prompt(tokens: &[u32], context_size: usize, max_new: usize) -> &[u32] {
    let room = max_new.clamp(1, (context_size / 4).max(1));
    let keep = context_size.saturating_sub(room).max(1);
    if tokens.len() > keep {
        &tokens[tokens.len() - keep..]
    } else {
        tokens
    }
}

/// Byte offset of the earliest stop sequence in `text`
pub(crate) fn find_stop(text: &str, stops: &[String]) -> Option<usize> {
    stops
        .iter()
        .filter(|stop| !stop.is_empty())
        .filter_map(|stop| text.find(stop.as_str()))
        .min()
}

struct Run<'a> {
    model: &'a mut ModelWeights,
    tokenizer: &'a Tokenizer,
    device: &'a Device,
    eos_token: Option<u32>,
    defaults: &'a LlamaConfig,
}

impl Run<'_> {
    fn generate(self, prompt: &str, request: &GenerationConfig) -> Result<(String, u32, FinishReason)> {
        let encoding = self.tokenizer.encode(prompt, true).map_err(llm_err)?;
        let context_size = self.defaults.context_size;
        let max_new = request.max_tokens as usize;

        let prompt_tokens = fit_prompt(encoding.get_ids(), context_size, max_new).to_vec();
        if prompt_tokens.len() < encoding.get_ids().len() {
            debug!(
                "Prompt truncated from {} to {} tokens",
                encoding.get_ids().len(),
                prompt_tokens.len()
            );
        }

        let mut logits_processor =
            LogitsProcessor::from_sampling(self.defaults.seed, sampling(request, self.defaults));
        let penalty = repeat_penalty(request, self.defaults);
        let mut history = prompt_tokens.clone();
        let mut generated: Vec<u32> = Vec::new();
        let mut input = prompt_tokens;
        let mut index_pos = 0;

        let finish = loop {
            if generated.len() >= max_new {
                break FinishReason::MaxTokens;
            }
            if index_pos + input.len() > context_size {
                break FinishReason::ContextFull;
            }

            let tensor = Tensor::new(input.as_slice(), self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(llm_err)?;
            let logits = self
                .model
                .forward(&tensor, index_pos)
                .and_then(|l| l.squeeze(0))
                .map_err(llm_err)?;
            index_pos += input.len();

            let logits = if penalty == 1.0 {
                logits
            } else {
                let start = history.len().saturating_sub(self.defaults.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    penalty,
                    &history[start..],
                )
                .map_err(llm_err)?
            };

            let token = logits_processor.sample(&logits).map_err(llm_err)?;
            if Some(token) == self.eos_token {
                break FinishReason::EndOfText;
            }
            history.push(token);
            generated.push(token);

            let text = self.tokenizer.decode(&generated, true).map_err(llm_err)?;
            if let Some(cut) = find_stop(&text, &request.stop_sequences) {
                return Ok((text[..cut].to_string(), generated.len() as u32, FinishReason::StopSequence));
            }

            input = vec![token];
        };

        let text = self.tokenizer.decode(&generated, true).map_err(llm_err)?;
        Ok((text, generated.len() as u32, finish))
    }
}

#[async_trait]
impl LLMProvider for LocalLlama {
    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        let model = Arc::clone(&self.model);
        let tokenizer = Arc::clone(&self.tokenizer);
        let device = self.device.clone();
        let eos_token = self.eos_token;
        let defaults = self.config.clone();
        let prompt = prompt.to_string();
        let request = config.clone();

        let (text, tokens_used, finish_reason) = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::LLMProvider(format!("Lock error: {}", e)))?;
            Run {
                model: &mut model,
                tokenizer: &tokenizer,
                device: &device,
                eos_token,
                defaults: &defaults,
            }
            .generate(&prompt, &request)
        })
        .await
        .map_err(|e| Error::LLMProvider(format!("generation task failed: {}", e)))??;

        debug!("Generated {} tokens ({:?})", tokens_used, finish_reason);

        Ok(GenerationResult {
            text,
            model_id: self.model_id.clone(),
            tokens_used: Some(tokens_used),
            finish_reason,
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
