//! Answer types produced by the question-answering pipeline

use serde::{Deserialize, Serialize};

/// Returned when the question is empty.
pub const GUIDANCE_MESSAGE: &str = "Please provide a valid question.";
/// Returned when nothing relevant was retrieved or generation produced nothing.
pub const FALLBACK_ANSWER: &str = "I don't know.";

/// How an answer was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Empty question; nothing was retrieved or generated.
    Guidance,
    /// Retrieval returned no usable chunks.
    NoContext,
    /// The model produced a non-empty answer.
    Generated,
    /// Generation failed or returned only whitespace.
    GenerationFailed,
}

/// Answer to a single question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub kind: AnswerKind,
    /// Sources of the chunks used as context, in ranked order.
    pub sources: Vec<String>,
}

impl Answer {
    pub fn guidance(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: AnswerKind::Guidance,
            sources: Vec::new(),
        }
    }

    pub fn fallback(text: impl Into<String>, kind: AnswerKind, sources: Vec<String>) -> Self {
        Self {
            text: text.into(),
            kind,
            sources,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.kind, AnswerKind::NoContext | AnswerKind::GenerationFailed)
    }
}
