//! # docqa
//!
//! Answers questions from a folder of PDFs and a list of FAQ pages.
//!
//! Usage:
//!   docqa serve                      # HTTP API on 0.0.0.0:8000
//!   docqa serve --refresh-on-start   # rebuild the index before serving
//!   docqa refresh                    # rebuild the index and exit
//!   docqa ask "What are your hours?" # one question from the terminal
//!   docqa fetch-model                # download the model weights

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa_core::{AppConfig, Embedder, LLMProvider};
use docqa_llama::{LlamaConfig, LocalLlama, ensure_model};
use docqa_rag::{IndexBuilder, QaService, embedder_from_config};
use docqa_server::AppState;

#[derive(Parser)]
#[command(name = "docqa", version, about = "Question answering over local documents and FAQ pages")]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Address to bind (defaults to DOCQA_BIND_ADDR)
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Rebuild the index before serving instead of requiring one on disk
        #[arg(long)]
        refresh_on_start: bool,
    },
    /// Rebuild the vector index and exit
    Refresh,
    /// Answer a single question
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Download the model weights if they are missing
    FetchModel,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "docqa=debug,docqa_core=debug,docqa_rag=debug,docqa_llama=debug,docqa_server=debug,tower_http=debug"
    } else {
        "docqa=info,docqa_core=info,docqa_rag=info,docqa_llama=info,docqa_server=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    match cli.command {
        Command::Serve {
            addr,
            refresh_on_start,
        } => {
            let addr = match addr {
                Some(addr) => addr,
                None => config
                    .bind_addr
                    .parse()
                    .with_context(|| format!("invalid DOCQA_BIND_ADDR '{}'", config.bind_addr))?,
            };

            let embedder = load_embedder(&config).await?;
            let llm = load_llm().await?;

            let service = if refresh_on_start {
                let (service, report) = QaService::build_and_open(&config, embedder, llm).await?;
                tracing::info!(
                    "📚 Indexed {} file and {} web documents",
                    report.file_documents,
                    report.web_documents
                );
                service
            } else {
                QaService::open(&config, embedder, llm).with_context(|| {
                    format!(
                        "no usable index in {}; run `docqa refresh` or pass --refresh-on-start",
                        config.index_dir.display()
                    )
                })?
            };

            let state = AppState {
                service: Arc::new(service),
                static_dir: config.static_dir.clone(),
            };
            docqa_server::serve(state, addr).await?;
        }
        Command::Refresh => {
            let embedder = load_embedder(&config).await?;
            let report = IndexBuilder::new(&config, embedder)?.refresh().await?;

            println!(
                "Indexed {} chunks from {} files and {} pages in {:.1}s",
                report.chunks,
                report.file_documents,
                report.web_documents,
                report.elapsed.as_secs_f32()
            );
            for url in &report.failed_urls {
                println!("  failed: {}", url);
            }
        }
        Command::Ask { question } => {
            let embedder = load_embedder(&config).await?;
            let llm = load_llm().await?;
            let service = QaService::open(&config, embedder, llm)
                .context("no usable index; run `docqa refresh` first")?;

            let answer = service.ask(&question.join(" ")).await;
            println!("{}", answer.text);
            for source in &answer.sources {
                tracing::debug!("source: {}", source);
            }
        }
        Command::FetchModel => {
            let llama_config = LlamaConfig::from_env()?;
            let path = ensure_model(&llama_config).await?;
            println!("Model ready at {}", path.display());
        }
    }

    Ok(())
}

async fn load_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    let config = config.clone();
    let embedder = tokio::task::spawn_blocking(move || embedder_from_config(&config)).await??;
    Ok(embedder)
}

async fn load_llm() -> Result<Arc<dyn LLMProvider>> {
    let llama_config = LlamaConfig::from_env()?;
    ensure_model(&llama_config).await?;
    let llm = tokio::task::spawn_blocking(move || LocalLlama::load(llama_config)).await??;
    Ok(Arc::new(llm))
}
