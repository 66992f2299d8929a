//! LLM provider trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Configuration for text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    /// `None` means greedy decoding.
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// `None` leaves the choice to the backend.
    pub repeat_penalty: Option<f32>,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: None,
            top_p: None,
            repeat_penalty: None,
            stop_sequences: vec!["Question:".to_string()],
        }
    }
}

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndOfText,
    StopSequence,
    MaxTokens,
    ContextFull,
}

/// Result of a text generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub model_id: String,
    pub tokens_used: Option<u32>,
    pub finish_reason: FinishReason,
}

/// Trait for language model backends
///
/// Implementations may block for a long time inside `generate_with_config`;
/// there is no cancellation contract beyond `max_tokens`.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate text using the default configuration
    async fn generate(&self, prompt: &str) -> Result<GenerationResult> {
        self.generate_with_config(prompt, &GenerationConfig::default())
            .await
    }

    /// Generate text with custom configuration
    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult>;

    /// Get the model ID being used
    fn model_id(&self) -> &str;
}
