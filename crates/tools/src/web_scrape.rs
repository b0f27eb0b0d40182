//! Web scrape tool — fetches a page and reduces it to readable text.

use std::sync::Arc;

use async_trait::async_trait;
use docchat_core::error::ToolError;
use docchat_core::tool::{Tool, ToolContext, ToolResult};
use scraper::Html;
use tracing::{debug, warn};

use crate::truncate_chars;

/// Subtrees that never contain article text.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "form", "iframe", "svg",
];

/// Fetches the raw body of a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ToolError>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: "web_scrape".into(),
            reason,
        };

        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?
            .error_for_status()
            .map_err(|e| fail(e.to_string()))?
            .text()
            .await
            .map_err(|e| fail(e.to_string()))
    }
}

/// Extract visible text from an HTML document: one line per text node,
/// trimmed, blank lines dropped, noise subtrees skipped.
pub fn clean_html(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let in_noise = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NOISE_TAGS.contains(&el.name()))
        });
        if in_noise {
            continue;
        }

        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned),
        );
    }

    lines.join("\n")
}

pub struct WebScrapeTool {
    fetcher: Arc<dyn PageFetcher>,
    max_chars: usize,
}

impl WebScrapeTool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_chars: usize) -> Self {
        Self { fetcher, max_chars }
    }
}

#[async_trait]
impl Tool for WebScrapeTool {
    fn name(&self) -> &str {
        "web_scrape"
    }

    fn description(&self) -> &str {
        "Fetch a specific web page by URL and return its readable text content. \
         Use when the user provides a link or a search result needs to be read in full."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The full http(s) URL of the page"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(ToolResult::failed(format!(
                "Error scraping {url}: URL must start with http:// or https://"
            )));
        }

        debug!(url = %url, "Scraping page");

        match self.fetcher.fetch(url).await {
            Ok(body) => {
                let text = clean_html(&body);
                Ok(ToolResult::ok(truncate_chars(&text, self.max_chars)))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Scrape failed");
                Ok(ToolResult::failed(format!("Error scraping {url}: {e}")))
            }
        }
    }
}
