//! Full index rebuild

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use docqa_core::{AppConfig, Chunk, Embedder, Error, Result};

use crate::chunker::Chunker;
use crate::index::{IndexEntry, VectorIndex};
use crate::loader;
use crate::web_scraper::{WebScraper, read_url_list};

/// Summary of one refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub file_documents: usize,
    pub web_documents: usize,
    pub chunks: usize,
    pub failed_urls: Vec<String>,
    pub elapsed: Duration,
}

/// Rebuilds the persisted index from the document directory and URL list
pub struct IndexBuilder {
    pdf_dir: PathBuf,
    urls_file: PathBuf,
    index_dir: PathBuf,
    chunker: Chunker,
    scraper: WebScraper,
    embedder: Arc<dyn Embedder>,
    refresh_lock: Mutex<()>,
}

impl IndexBuilder {
    pub fn new(config: &AppConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            pdf_dir: config.pdf_dir.clone(),
            urls_file: config.urls_file.clone(),
            index_dir: config.index_dir.clone(),
            chunker: Chunker::new(config.chunking)?,
            scraper: WebScraper::new(Duration::from_secs(config.fetch_timeout_secs))?,
            embedder,
            refresh_lock: Mutex::new(()),
        })
    }

    /// Use a custom scraper (e.g. different selectors)
    pub fn with_scraper(mut self, scraper: WebScraper) -> Self {
        self.scraper = scraper;
        self
    }

    pub fn index_dir(&self) -> &PathBuf {
        &self.index_dir
    }

    /// Load, scrape, chunk, embed and persist. Embedding or write failures
    /// abort the refresh and leave the previous index in place; failed URLs
    /// only shrink the input.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        self.rebuild().await.map(|(_, report)| report)
    }

    /// Same as [`IndexBuilder::refresh`], also handing back the index that
    /// was persisted
    pub async fn rebuild(&self) -> Result<(VectorIndex, RefreshReport)> {
        let _guard = self.refresh_lock.lock().await;
        let started = Instant::now();
        info!("🔄 Refreshing index from {} and {}", self.pdf_dir.display(), self.urls_file.display());

        let pdf_dir = self.pdf_dir.clone();
        let mut documents = tokio::task::spawn_blocking(move || loader::load_documents(&pdf_dir))
            .await
            .map_err(|e| Error::DocumentLoader(format!("loader task failed: {}", e)))??;
        let file_documents = documents.len();

        let urls = read_url_list(&self.urls_file)?;
        let scraped = self.scraper.scrape_all(&urls).await;
        let web_documents = scraped.documents.len();
        documents.extend(scraped.documents);

        let chunks = self.chunker.split(&documents);
        info!("✂️  Split {} documents into {} chunks", documents.len(), chunks.len());

        let index = self.embed(chunks).await?;
        let chunk_count = index.len();

        let index_dir = self.index_dir.clone();
        let index = tokio::task::spawn_blocking(move || index.save(&index_dir).map(|()| index))
            .await
            .map_err(|e| Error::Other(format!("index write task failed: {}", e)))??;

        let report = RefreshReport {
            file_documents,
            web_documents,
            chunks: chunk_count,
            failed_urls: scraped.failed.into_iter().map(|(url, _)| url).collect(),
            elapsed: started.elapsed(),
        };
        info!(
            "✅ Index refreshed with {} chunks in {:.1}s",
            report.chunks,
            report.elapsed.as_secs_f32()
        );
        Ok((index, report))
    }

    async fn embed(&self, chunks: Vec<Chunk>) -> Result<VectorIndex> {
        let embedder = Arc::clone(&self.embedder);

        tokio::task::spawn_blocking(move || {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let embeddings = embedder.embed_batch(&texts)?;

            let entries = chunks
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| IndexEntry { chunk, embedding })
                .collect();

            VectorIndex::new(embedder.model_id(), embedder.dimension(), entries)
        })
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))?
    }
}
