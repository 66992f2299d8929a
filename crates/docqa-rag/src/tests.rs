//! End-to-end tests for the indexing and answering pipeline

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use docqa_core::{
    AnswerKind, AppConfig, EmbedderKind, Embedder, Error, FALLBACK_ANSWER, FinishReason,
    GUIDANCE_MESSAGE, GenerationConfig, GenerationResult, LLMProvider, Result,
};

use crate::{HashEmbedder, IndexBuilder, QaService, Retriever, VectorIndex};

const HOURS_FAQ: &str = r#"
    <html><body><div class="list-content">
      <div class="tab-label">What are your hours?</div>
      <div class="tab-content">9-5 Mon-Fri</div>
    </div></body></html>
"#;

/// LLM double that records prompts and replies with a fixed script
struct ScriptedLlm {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn generate_with_config(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationResult> {
        assert_eq!(config.stop_sequences, vec!["Question:".to_string()]);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(GenerationResult {
                text: text.clone(),
                model_id: self.model_id().to_string(),
                tokens_used: Some(4),
                finish_reason: FinishReason::EndOfText,
            }),
            Err(message) => Err(Error::LLMProvider(message.clone())),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Hash embedder that counts calls
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HashEmbedder::default(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Hash embedder that can be switched into failing
struct FlakyEmbedder {
    inner: HashEmbedder,
    failing: AtomicBool,
}

impl Embedder for FlakyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Embedding("model unavailable".to_string()));
        }
        self.inner.embed(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        pdf_dir: root.join("pdfs"),
        urls_file: root.join("urls.txt"),
        index_dir: root.join("vector_index"),
        static_dir: root.join("static"),
        embedder: EmbedderKind::Hash,
        fetch_timeout_secs: 2,
        ..AppConfig::default()
    }
}

fn write_doc(root: &Path, name: &str, content: &str) {
    let dir = root.join("pdfs");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

/// Serve `html` for every request on an ephemeral local port
async fn serve_html(html: &'static str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    html.len(),
                    html
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}/faq", addr)
}

async fn service_with(
    root: &TempDir,
    llm: Arc<ScriptedLlm>,
) -> (QaService, Arc<CountingEmbedder>) {
    let embedder = CountingEmbedder::new();
    let (service, _) = QaService::build_and_open(&test_config(root.path()), embedder.clone(), llm)
        .await
        .unwrap();
    (service, embedder)
}

#[tokio::test]
async fn test_empty_question_returns_guidance_without_work() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let llm = ScriptedLlm::replying("unused");
    let (service, embedder) = service_with(&root, llm.clone()).await;
    let embeds_before = embedder.calls();

    for question in ["", "   ", "\n\t"] {
        let answer = service.ask(question).await;
        assert_eq!(answer.text, GUIDANCE_MESSAGE);
        assert_eq!(answer.kind, AnswerKind::Guidance);
    }

    assert_ne!(GUIDANCE_MESSAGE, FALLBACK_ANSWER);
    assert_eq!(embedder.calls(), embeds_before);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_matching_question_is_answered_from_context() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let llm = ScriptedLlm::replying("  We are open 9-5, Monday to Friday.\n");
    let (service, _) = service_with(&root, llm.clone()).await;

    let answer = service.ask("  What are your hours?  ").await;

    assert_eq!(answer.kind, AnswerKind::Generated);
    assert_eq!(answer.text, "We are open 9-5, Monday to Friday.");
    assert_eq!(llm.calls(), 1);
    let prompt = llm.last_prompt();
    assert!(prompt.contains("Q: What are your hours? A: 9-5 Mon-Fri"));
    assert!(prompt.ends_with("Question: What are your hours?\nAnswer:"));
}

#[tokio::test]
async fn test_irrelevant_question_gets_exact_fallback() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let llm = ScriptedLlm::replying("should not be called");
    let (service, _) = service_with(&root, llm.clone()).await;

    let answer = service.ask("asdkjasdkj nonsense").await;

    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert_eq!(answer.kind, AnswerKind::NoContext);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_empty_index_gives_fallback() {
    let root = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::replying("unused");
    let (service, _) = service_with(&root, llm.clone()).await;

    let answer = service.ask("What are your hours?").await;
    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_blank_generation_falls_back() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let (service, _) = service_with(&root, ScriptedLlm::replying(" \n\t ")).await;

    let answer = service.ask("What are your hours?").await;
    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert_eq!(answer.kind, AnswerKind::GenerationFailed);
}

#[tokio::test]
async fn test_generation_error_falls_back() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let (service, _) = service_with(&root, ScriptedLlm::failing("out of memory")).await;

    let answer = service.ask("What are your hours?").await;
    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert_eq!(answer.kind, AnswerKind::GenerationFailed);
    assert!(answer.is_fallback());
}

#[tokio::test]
async fn test_prompt_context_never_exceeds_budget() {
    let root = tempfile::tempdir().unwrap();
    let long = "shipping shipping rates worldwide delivery ".repeat(60);
    for i in 0..6 {
        write_doc(root.path(), &format!("ship-{}.txt", i), &long);
    }
    let llm = ScriptedLlm::replying("ok");
    let (service, _) = service_with(&root, llm.clone()).await;

    let answer = service.ask("shipping rates worldwide delivery").await;
    assert_eq!(answer.kind, AnswerKind::Generated);
    assert_eq!(answer.sources.len(), 4);

    let prompt = llm.last_prompt();
    let start = prompt.find("Context:\n").unwrap() + "Context:\n".len();
    let end = prompt.rfind("\n\nQuestion:").unwrap();
    assert_eq!(prompt[start..end].chars().count(), 1200);
}

#[tokio::test]
async fn test_fetch_failure_does_not_abort_refresh() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "returns.txt", "Returns are accepted within 30 days.");
    let live = serve_html(HOURS_FAQ).await;
    std::fs::write(
        root.path().join("urls.txt"),
        format!("http://127.0.0.1:9/dead\n{}\n", live),
    )
    .unwrap();

    let config = test_config(root.path());
    let builder = IndexBuilder::new(&config, Arc::new(HashEmbedder::default())).unwrap();
    let report = builder.refresh().await.unwrap();

    assert_eq!(report.file_documents, 1);
    assert_eq!(report.web_documents, 1);
    assert_eq!(report.failed_urls, vec!["http://127.0.0.1:9/dead".to_string()]);

    let index = VectorIndex::load(&config.index_dir).unwrap();
    let sources: Vec<&str> = index.entries().iter().map(|e| e.chunk.source()).collect();
    assert!(sources.iter().any(|s| s.ends_with("returns.txt")));
    assert!(sources.contains(&live.as_str()));
    assert!(
        index
            .entries()
            .iter()
            .any(|e| e.chunk.content == "Q: What are your hours?\nA: 9-5 Mon-Fri")
    );
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "a.txt", &"Our store sells garden tools and seeds. ".repeat(30));
    write_doc(root.path(), "b.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");

    let config = test_config(root.path());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let builder = IndexBuilder::new(&config, embedder.clone()).unwrap();

    let mut results = Vec::new();
    for _ in 0..2 {
        builder.refresh().await.unwrap();
        let retriever = Retriever::load(&config.index_dir, embedder.clone(), None).unwrap();
        let hits: Vec<String> = retriever
            .query("garden tools and seeds", 4)
            .unwrap()
            .into_iter()
            .map(|hit| hit.chunk.content)
            .collect();
        results.push(hits);
    }

    assert!(!results[0].is_empty());
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_refresh_swaps_in_new_content() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let llm = ScriptedLlm::replying("Returns within 30 days.");
    let (service, _) = service_with(&root, llm.clone()).await;

    let before = service.ask("What is the returns policy?").await;
    assert_eq!(before.text, FALLBACK_ANSWER);

    write_doc(root.path(), "returns.txt", "Q: What is the returns policy?\nA: Returns within 30 days.");
    let report = service.refresh().await.unwrap();
    assert_eq!(report.file_documents, 2);
    assert_eq!(service.stats().unwrap().index.chunk_count, 2);

    let after = service.ask("What is the returns policy?").await;
    assert_eq!(after.kind, AnswerKind::Generated);
    assert!(after.sources.iter().any(|s| s.ends_with("returns.txt")));
}

#[tokio::test]
async fn test_open_without_index_fails_fast() {
    let root = tempfile::tempdir().unwrap();
    let result = QaService::open(
        &test_config(root.path()),
        Arc::new(HashEmbedder::default()),
        ScriptedLlm::replying("unused"),
    );
    assert!(matches!(result, Err(Error::IndexNotFound(_))));
}

#[tokio::test]
async fn test_embedding_failure_keeps_previous_index() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "hours.txt", "Q: What are your hours?\nA: 9-5 Mon-Fri");
    let config = test_config(root.path());

    let embedder = Arc::new(FlakyEmbedder {
        inner: HashEmbedder::default(),
        failing: AtomicBool::new(false),
    });
    let (service, _) =
        QaService::build_and_open(&config, embedder.clone(), ScriptedLlm::replying("9-5"))
            .await
            .unwrap();
    let before = VectorIndex::load(&config.index_dir).unwrap();

    write_doc(root.path(), "returns.txt", "Returns are accepted within 30 days.");
    embedder.failing.store(true, Ordering::SeqCst);
    let result = service.refresh().await;
    assert!(matches!(result, Err(Error::Embedding(_))));

    let after = VectorIndex::load(&config.index_dir).unwrap();
    assert_eq!(after.meta(), before.meta());
    assert_eq!(after.entries(), before.entries());
    assert_eq!(service.stats().unwrap().index.chunk_count, 1);

    let leftovers: Vec<String> = std::fs::read_dir(root.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".vector_index."))
        .collect();
    assert!(leftovers.is_empty(), "stray directories: {:?}", leftovers);
}

#[tokio::test]
async fn test_concurrent_refreshes_serve_newest_index() {
    let root = tempfile::tempdir().unwrap();
    write_doc(root.path(), "doc-0.txt", "Document number zero.");
    let config = test_config(root.path());
    let (service, _) = service_with(&root, ScriptedLlm::replying("ok")).await;

    let refresh_after_adding = |i: usize| {
        let service = &service;
        let root = root.path();
        async move {
            write_doc(root, &format!("doc-{}.txt", i), &format!("Document number {}.", i));
            service.refresh().await.map(|report| report.chunks)
        }
    };

    let (a, b, c, d) = tokio::join!(
        refresh_after_adding(1),
        refresh_after_adding(2),
        refresh_after_adding(3),
        refresh_after_adding(4),
    );
    for result in [a, b, c, d] {
        assert!(result.unwrap() >= 1);
    }

    let on_disk = VectorIndex::load(&config.index_dir).unwrap();
    assert_eq!(on_disk.len(), 5);

    let served = service.stats().unwrap().index;
    assert_eq!(served.chunk_count, 5);
    assert_eq!(served.built_at, on_disk.meta().built_at);
}
