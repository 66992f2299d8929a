//! Model weight download

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use docqa_core::{Error, Result};

use crate::config::LlamaConfig;

const PROGRESS_STEP: u64 = 64 * 1024 * 1024;

/// Make sure the GGUF weights exist locally, downloading them if needed
pub async fn ensure_model(config: &LlamaConfig) -> Result<PathBuf> {
    let path = config.model_path.clone();
    if path.is_file() {
        info!("📦 Model already present at {}", path.display());
        return Ok(path);
    }

    info!("⬇️  Downloading model from {}", config.model_url);
    let bytes = download(&config.model_url, &path).await?;
    info!("✅ Saved {} MiB to {}", bytes / (1024 * 1024), path.display());
    Ok(path)
}

/// Stream `url` into `dest`. Data goes to a `.part` sibling first and is
/// renamed into place only once complete.
pub async fn download(url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let part = part_path(dest);
    match stream_to(url, &part).await {
        Ok(bytes) => {
            tokio::fs::rename(&part, dest).await?;
            Ok(bytes)
        }
        Err(e) => {
            if tokio::fs::remove_file(&part).await.is_ok() {
                warn!("Removed partial download {}", part.display());
            }
            Err(e)
        }
    }
}

async fn stream_to(url: &str, part: &Path) -> Result<u64> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Network(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::Network(format!("model download failed: {}", e)))?;

    let total = response.content_length();
    let mut file = tokio::fs::File::create(part).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    let mut next_report = PROGRESS_STEP;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Network(format!("model download interrupted: {}", e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;

        if written >= next_report {
            match total {
                Some(total) => info!("   {} / {} MiB", written >> 20, total >> 20),
                None => info!("   {} MiB", written >> 20),
            }
            next_report += PROGRESS_STEP;
        }
    }

    file.flush().await?;
    file.sync_all().await?;

    if let Some(total) = total {
        if written != total {
            return Err(Error::Network(format!(
                "model download truncated: got {} of {} bytes",
                written, total
            )));
        }
    }

    Ok(written)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "model".into());
    name.push(".part");
    dest.with_file_name(name)
}
