//! Retrieval tool implementations for docchat.
//!
//! Tools give a turn access to information the model does not have:
//! the session's uploaded documents, live web search results, and the
//! cleaned text of a specific web page.
//!
//! Adapters never fail the turn: handled errors come back as text the
//! model can read.

pub mod document_search;
pub mod web_scrape;
pub mod web_search;

use std::sync::Arc;
use std::time::Duration;

use docchat_config::ScrapeConfig;
use docchat_core::document::DocumentStore;
use docchat_core::error::ToolError;
use docchat_core::tool::ToolRegistry;

pub use document_search::DocumentSearchTool;
pub use web_scrape::{HttpPageFetcher, PageFetcher, WebScrapeTool, clean_html};
pub use web_search::{SearchHit, SearchProvider, TavilyClient, WebSearchTool};

/// Build the process-wide HTTP client shared by the web adapters.
///
/// Redirects are followed (reqwest's default policy) and every request is
/// bounded by `timeout_secs`.
pub fn http_client(config: &ScrapeConfig) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "http_client".into(),
            reason: e.to_string(),
        })
}

/// Create the registry with the three retrieval tools.
pub fn default_registry(
    documents: DocumentSearchTool,
    search: WebSearchTool,
    scrape: WebScrapeTool,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(documents));
    registry.register(Box::new(search));
    registry.register(Box::new(scrape));
    registry
}

/// Wire the adapters to their backends using configuration.
pub fn registry_from_config(
    config: &docchat_config::AppConfig,
    store: Arc<dyn DocumentStore>,
    client: reqwest::Client,
) -> ToolRegistry {
    let search: Arc<dyn SearchProvider> = Arc::new(TavilyClient::new(&config.search, client.clone()));
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(client));

    default_registry(
        DocumentSearchTool::new(store, config.documents.limit, config.documents.min_score),
        WebSearchTool::new(search, &config.search),
        WebScrapeTool::new(fetcher, config.scrape.max_chars),
    )
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn http_client_builds_from_defaults() {
        assert!(http_client(&ScrapeConfig::default()).is_ok());
    }
}
