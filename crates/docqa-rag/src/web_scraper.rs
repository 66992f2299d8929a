//! FAQ page scraping
//!
//! Pages are expected to use an accordion layout: a `.list-content`
//! container holding `.tab-label` questions, each followed by a
//! `.tab-content` answer. The markup is undocumented, so the selectors live
//! in a versioned [`AccordionSelectors`] adapter rather than being baked in.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use docqa_core::{Document, Error, KIND_KEY, Result};

/// CSS selectors describing where questions and answers live on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccordionSelectors {
    pub version: String,
    pub container: String,
    pub label: String,
    pub content: String,
}

impl Default for AccordionSelectors {
    fn default() -> Self {
        Self {
            version: "accordion-v1".to_string(),
            container: ".list-content".to_string(),
            label: ".tab-label".to_string(),
            content: ".tab-content".to_string(),
        }
    }
}

/// A question and its answer as found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    fn render(&self) -> String {
        format!("Q: {}\nA: {}", self.question, self.answer)
    }
}

/// Outcome of scraping a list of URLs
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub documents: Vec<Document>,
    /// URLs that could not be fetched, with the reason
    pub failed: Vec<(String, String)>,
    /// URLs fetched successfully that held no Q&A pairs
    pub empty: Vec<String>,
}

struct CompiledSelectors {
    container: Selector,
    label: Selector,
    content: Selector,
    either: Selector,
}

impl CompiledSelectors {
    fn compile(selectors: &AccordionSelectors) -> Result<Self> {
        Ok(Self {
            container: parse_selector(&selectors.container)?,
            label: parse_selector(&selectors.label)?,
            content: parse_selector(&selectors.content)?,
            either: parse_selector(&format!("{}, {}", selectors.label, selectors.content))?,
        })
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| Error::Configuration(format!("invalid CSS selector '{}': {:?}", css, e)))
}

/// Fetches FAQ pages and turns their accordions into documents
pub struct WebScraper {
    client: Client,
    selectors: AccordionSelectors,
    compiled: CompiledSelectors,
}

impl WebScraper {
    /// Create a scraper with the default selectors and the given fetch timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_selectors(timeout, AccordionSelectors::default())
    }

    /// Create a scraper with custom selectors
    pub fn with_selectors(timeout: Duration, selectors: AccordionSelectors) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("docqa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        let compiled = CompiledSelectors::compile(&selectors)?;

        Ok(Self {
            client,
            selectors,
            compiled,
        })
    }

    pub fn selectors(&self) -> &AccordionSelectors {
        &self.selectors
    }

    /// Scrape every URL once. Failures are recorded, never propagated.
    pub async fn scrape_all(&self, urls: &[String]) -> ScrapeReport {
        let mut report = ScrapeReport::default();

        for url in urls {
            match self.scrape(url).await {
                Ok(Some(document)) => report.documents.push(document),
                Ok(None) => {
                    info!("No Q&A content found in accordions for {}", url);
                    report.empty.push(url.clone());
                }
                Err(e) => {
                    warn!("⚠️  Failed to fetch {}: {}", url, e);
                    report.failed.push((url.clone(), e.to_string()));
                }
            }
        }

        info!(
            "🌐 Scraped {} pages ({} failed, {} without Q&A)",
            report.documents.len(),
            report.failed.len(),
            report.empty.len()
        );
        report
    }

    /// Fetch one page and build its document; `Ok(None)` when it has no pairs
    pub async fn scrape(&self, url: &str) -> Result<Option<Document>> {
        let html = self.fetch(url).await?;
        let pairs = self.extract_qa_pairs(&html);
        debug!("Found {} Q&A pairs on {}", pairs.len(), url);

        if pairs.is_empty() {
            return Ok(None);
        }

        let content = pairs
            .iter()
            .map(QaPair::render)
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Some(
            Document::new(content, url)
                .with_metadata(KIND_KEY, "web")
                .with_metadata("scraper", self.selectors.version.as_str()),
        ))
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Network(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }

    /// Pair every label inside a container with the first content element
    /// that follows it in document order
    pub fn extract_qa_pairs(&self, html: &str) -> Vec<QaPair> {
        let document = Html::parse_document(html);
        let mut pairs = Vec::new();

        for container in document.select(&self.compiled.container) {
            let items: Vec<ElementRef> = container.select(&self.compiled.either).collect();

            for (i, item) in items.iter().enumerate() {
                if !self.compiled.label.matches(item) {
                    continue;
                }

                let answer = items[i + 1..]
                    .iter()
                    .find(|candidate| self.compiled.content.matches(candidate));

                if let Some(answer) = answer {
                    let question = element_text(item);
                    if question.is_empty() {
                        continue;
                    }
                    pairs.push(QaPair {
                        question,
                        answer: element_text(answer),
                    });
                }
            }
        }

        pairs
    }
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read a newline-delimited URL list. A missing file means no URLs; blank
/// lines, `#` comments and non-http(s) entries are skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        info!("🔗 URL list {} not found, no pages to scrape", path.display());
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let mut urls = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Url::parse(line) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => urls.push(line.to_string()),
            Ok(_) | Err(_) => warn!("⚠️  Ignoring invalid URL in {}: {}", path.display(), line),
        }
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FAQ_HTML: &str = r#"
        <html><body>
          <div class="list-content">
            <div class="tab">
              <label class="tab-label">What are your hours?</label>
              <div class="tab-content"><p>9-5</p> <p>Mon-Fri</p></div>
            </div>
            <div class="tab">
              <label class="tab-label">  Do you ship abroad? </label>
              <div class="tab-content">Yes, worldwide.</div>
            </div>
          </div>
          <div class="tab-label">Outside any accordion</div>
          <div class="tab-content">ignored</div>
        </body></html>
    "#;

    fn scraper() -> WebScraper {
        WebScraper::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_extract_qa_pairs() {
        let pairs = scraper().extract_qa_pairs(FAQ_HTML);
        assert_eq!(
            pairs,
            vec![
                QaPair {
                    question: "What are your hours?".to_string(),
                    answer: "9-5 Mon-Fri".to_string(),
                },
                QaPair {
                    question: "Do you ship abroad?".to_string(),
                    answer: "Yes, worldwide.".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_label_without_following_content_is_dropped() {
        let html = r#"<div class="list-content"><span class="tab-content">orphan</span><span class="tab-label">Q?</span></div>"#;
        assert!(scraper().extract_qa_pairs(html).is_empty());
    }

    #[test]
    fn test_no_accordion_means_no_pairs() {
        assert!(scraper().extract_qa_pairs("<p>plain page</p>").is_empty());
    }

    #[test]
    fn test_custom_selectors() {
        let selectors = AccordionSelectors {
            version: "faq-v2".to_string(),
            container: "dl".to_string(),
            label: "dt".to_string(),
            content: "dd".to_string(),
        };
        let scraper = WebScraper::with_selectors(Duration::from_secs(1), selectors).unwrap();
        let pairs = scraper.extract_qa_pairs("<dl><dt>Price?</dt><dd>Free</dd></dl>");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].render(), "Q: Price?\nA: Free");
    }

    #[test]
    fn test_invalid_selector_is_configuration_error() {
        let selectors = AccordionSelectors {
            container: "[[".to_string(),
            ..AccordionSelectors::default()
        };
        let err = WebScraper::with_selectors(Duration::from_secs(1), selectors).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_read_url_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(
            &path,
            "https://example.com/faq\n\n# comment\nnot a url\nftp://example.com/x\n  http://example.org/help  \n",
        )
        .unwrap();

        let urls = read_url_list(&path).unwrap();
        assert_eq!(urls, vec!["https://example.com/faq", "http://example.org/help"]);
    }

    #[test]
    fn test_missing_url_list_is_empty() {
        let dir = tempdir().unwrap();
        assert!(read_url_list(&dir.path().join("urls.txt")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_url_is_reported_not_propagated() {
        let report = scraper()
            .scrape_all(&["http://127.0.0.1:9/faq".to_string()])
            .await;
        assert!(report.documents.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "http://127.0.0.1:9/faq");
    }
}
