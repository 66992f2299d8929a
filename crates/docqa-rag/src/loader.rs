//! Local document loading (PDF and plain text)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use docqa_core::{Document, Error, KIND_KEY, Result};

/// File extensions the loader understands
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

/// Load one document per supported file in `dir`, in sorted path order.
///
/// A missing directory yields no documents. Files whose text cannot be
/// extracted are logged and skipped.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        info!("📂 Document directory {} not found, nothing to load", dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && extension_of(path).is_some())
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        match load_file(&path) {
            Ok(Some(document)) => documents.push(document),
            Ok(None) => debug!("No text in {}, skipping", path.display()),
            Err(e) => warn!("⚠️  Skipping {}: {}", path.display(), e),
        }
    }

    info!("📄 Loaded {} documents from {}", documents.len(), dir.display());
    Ok(documents)
}

/// Load a single file; `Ok(None)` when it holds no text
pub fn load_file(path: &Path) -> Result<Option<Document>> {
    let (raw, kind) = match extension_of(path) {
        Some("pdf") => (extract_pdf_text(path)?, "pdf"),
        Some(_) => (std::fs::read_to_string(path)?, "text"),
        None => {
            return Err(Error::DocumentLoader(format!(
                "unsupported file type: {}",
                path.display()
            )));
        }
    };

    let content = normalize_whitespace(&raw);
    if content.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        Document::new(content, path.to_string_lossy()).with_metadata(KIND_KEY, kind),
    ))
}

fn extension_of(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().copied().find(|s| *s == ext)
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let owned = path.to_path_buf();
    // pdf-extract panics on some malformed files instead of returning an error
    match std::panic::catch_unwind(move || pdf_extract::extract_text(&owned)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(Error::DocumentLoader(format!(
            "failed to extract text from {}: {}",
            path.display(),
            e
        ))),
        Err(_) => Err(Error::DocumentLoader(format!(
            "PDF extractor panicked on {}",
            path.display()
        ))),
    }
}

fn paragraph_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t\r\x0c]*\n").expect("valid paragraph regex"))
}

/// Collapse whitespace inside paragraphs to single spaces while keeping
/// blank-line paragraph breaks as `"\n\n"`
pub fn normalize_whitespace(text: &str) -> String {
    paragraph_break()
        .split(text)
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
