//! Retrieval-augmented answer synthesis

use std::sync::Arc;

use tracing::{debug, warn};

use docqa_core::{
    Answer, AnswerKind, AppConfig, GenerationConfig, LLMProvider, Result, ScoredChunk,
};

use crate::retriever::RetrieverHandle;

/// Stop sequence that ends generation when the model starts a new turn.
pub const QUESTION_STOP: &str = "Question:";

/// Settings for answer synthesis
#[derive(Debug, Clone)]
pub struct AnswerConfig {
    pub top_k: usize,
    pub max_context_chars: usize,
    pub separator: String,
    pub fallback_answer: String,
    pub guidance_message: String,
    pub generation: GenerationConfig,
}

impl AnswerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.search.top_k,
            max_context_chars: config.max_context_chars,
            separator: "\n".to_string(),
            fallback_answer: config.fallback_answer.clone(),
            guidance_message: config.guidance_message.clone(),
            generation: GenerationConfig {
                max_tokens: config.max_tokens,
                stop_sequences: vec![QUESTION_STOP.to_string()],
                ..GenerationConfig::default()
            },
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Join chunk contents in ranked order and hard-cut to `max_chars` characters
pub fn assemble_context(chunks: &[ScoredChunk], separator: &str, max_chars: usize) -> String {
    chunks
        .iter()
        .map(|hit| hit.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join(separator)
        .chars()
        .take(max_chars)
        .collect()
}

/// Prompt asking the model to answer strictly from `context`
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a strict QA assistant. Only answer questions based on the context provided below. \
         Do not go beyond the context.\n\
         \n\
         Context:\n\
         {}\n\
         \n\
         Question: {}\n\
         Answer:",
        context, question
    )
}

/// Answers questions from retrieved context, falling back to a fixed reply
pub struct AnswerEngine {
    retriever: Arc<RetrieverHandle>,
    llm: Arc<dyn LLMProvider>,
    config: AnswerConfig,
}

impl AnswerEngine {
    pub fn new(retriever: Arc<RetrieverHandle>, llm: Arc<dyn LLMProvider>, config: AnswerConfig) -> Self {
        Self {
            retriever,
            llm,
            config,
        }
    }

    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// Answer one question. Never fails: problems downstream of the empty
    /// check turn into the fallback answer.
    pub async fn answer(&self, question: &str) -> Answer {
        let question = question.trim();
        if question.is_empty() {
            return Answer::guidance(&self.config.guidance_message);
        }

        let hits = match self.retrieve(question).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("⚠️  Retrieval failed: {}", e);
                Vec::new()
            }
        };
        if hits.is_empty() {
            return Answer::fallback(&self.config.fallback_answer, AnswerKind::NoContext, Vec::new());
        }

        let sources: Vec<String> = hits.iter().map(|hit| hit.chunk.source().to_string()).collect();
        let context = assemble_context(&hits, &self.config.separator, self.config.max_context_chars);
        let prompt = build_prompt(&context, question);
        debug!("Prompt has {} context chars from {} chunks", context.chars().count(), hits.len());

        match self.llm.generate_with_config(&prompt, &self.config.generation).await {
            Ok(result) => {
                let text = result.text.trim();
                if text.is_empty() {
                    Answer::fallback(&self.config.fallback_answer, AnswerKind::GenerationFailed, sources)
                } else {
                    Answer {
                        text: text.to_string(),
                        kind: AnswerKind::Generated,
                        sources,
                    }
                }
            }
            Err(e) => {
                warn!("⚠️  Generation failed: {}", e);
                Answer::fallback(&self.config.fallback_answer, AnswerKind::GenerationFailed, sources)
            }
        }
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let retriever = self.retriever.current()?;
        let question = question.to_string();
        let k = self.config.top_k;

        tokio::task::spawn_blocking(move || retriever.query(&question, k))
            .await
            .map_err(|e| docqa_core::Error::Other(format!("retrieval task failed: {}", e)))?
    }
}
