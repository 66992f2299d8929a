//! Question-answering service: ties the builder, retriever and engine together

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use docqa_core::{Answer, AppConfig, Embedder, LLMProvider, Result};

use crate::builder::{IndexBuilder, RefreshReport};
use crate::engine::{AnswerConfig, AnswerEngine};
use crate::index::IndexMeta;
use crate::retriever::{Retriever, RetrieverHandle};

/// Snapshot of the index currently being served
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub index: IndexMeta,
    pub model: String,
}

pub struct QaService {
    builder: IndexBuilder,
    retriever: Arc<RetrieverHandle>,
    engine: AnswerEngine,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LLMProvider>,
    score_threshold: Option<f32>,
    /// Held from rebuild to swap so the served index is always the newest on disk
    refresh_lock: Mutex<()>,
}

impl QaService {
    /// Open the persisted index and assemble the pipeline. Fails when no
    /// usable index exists; see [`QaService::build_and_open`].
    pub fn open(config: &AppConfig, embedder: Arc<dyn Embedder>, llm: Arc<dyn LLMProvider>) -> Result<Self> {
        let retriever = Retriever::load(&config.index_dir, Arc::clone(&embedder), config.search.score_threshold)?;
        Self::assemble(config, embedder, llm, retriever)
    }

    /// Rebuild the index first, then open it
    pub async fn build_and_open(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMProvider>,
    ) -> Result<(Self, RefreshReport)> {
        let builder = IndexBuilder::new(config, Arc::clone(&embedder))?;
        let report = builder.refresh().await?;
        let service = Self::open(config, embedder, llm)?;
        Ok((service, report))
    }

    fn assemble(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LLMProvider>,
        retriever: Retriever,
    ) -> Result<Self> {
        let builder = IndexBuilder::new(config, Arc::clone(&embedder))?;
        let retriever = Arc::new(RetrieverHandle::new(retriever));
        let engine = AnswerEngine::new(
            Arc::clone(&retriever),
            Arc::clone(&llm),
            AnswerConfig::from_app_config(config),
        );

        Ok(Self {
            builder,
            retriever,
            engine,
            embedder,
            llm,
            score_threshold: config.search.score_threshold,
            refresh_lock: Mutex::new(()),
        })
    }

    pub async fn ask(&self, question: &str) -> Answer {
        self.engine.answer(question).await
    }

    /// Rebuild and persist the index, then swap it in. Queries running
    /// meanwhile keep using the previous index; concurrent refreshes run one
    /// after another.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;

        let (index, report) = self.builder.rebuild().await?;
        let retriever = Retriever::from_index(index, Arc::clone(&self.embedder), self.score_threshold)?;
        self.retriever.replace(retriever)?;
        info!("🔁 Serving refreshed index ({} chunks)", report.chunks);
        Ok(report)
    }

    pub fn stats(&self) -> Result<ServiceStats> {
        let current = self.retriever.current()?;
        Ok(ServiceStats {
            index: current.meta().clone(),
            model: self.llm.model_id().to_string(),
        })
    }
}
