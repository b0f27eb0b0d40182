//! Web search tool backed by the Tavily search API.
//!
//! Hits are filtered by relevance and formatted with title and URL so the
//! answer can cite where a fact came from.

use std::sync::Arc;

use async_trait::async_trait;
use docchat_config::SearchConfig;
use docchat_core::error::ToolError;
use docchat_core::tool::{Tool, ToolContext, ToolResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::truncate_chars;

const NO_RESULTS: &str = "No relevant search results found.";
const SEARCH_FAILED: &str = "Error: Unable to fetch search results at this time.";

/// One ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f32,
}

fn default_title() -> String {
    "No Title".into()
}
fn default_url() -> String {
    "No URL".into()
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError>;
}

/// Tavily `/search` client.
pub struct TavilyClient {
    api_key: Option<String>,
    base_url: String,
    search_depth: String,
    client: reqwest::Client,
}

impl TavilyClient {
    pub fn new(config: &SearchConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            search_depth: config.search_depth.clone(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ToolError> {
        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason,
        };

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| fail("TAVILY_API_KEY is not configured".into()))?;

        let body = serde_json::json!({
            "query": query,
            "search_depth": self.search_depth,
            "max_results": max_results,
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?
            .error_for_status()
            .map_err(|e| fail(e.to_string()))?;

        let parsed: TavilyResponse = response.json().await.map_err(|e| fail(e.to_string()))?;
        Ok(parsed.results)
    }
}

pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
    min_score: f32,
    max_chars: usize,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, config: &SearchConfig) -> Self {
        Self {
            provider,
            max_results: config.max_results,
            min_score: config.min_score,
            max_chars: config.max_chars,
        }
    }

    /// Render hits for the model. Numbering follows the provider's ranking,
    /// so filtered hits leave gaps.
    fn format_hits(&self, hits: &[SearchHit]) -> String {
        let entries: Vec<String> = hits
            .iter()
            .enumerate()
            .filter(|(_, hit)| hit.score >= self.min_score)
            .map(|(i, hit)| {
                format!(
                    "[{}] Source: {}\nURL: {}\nContent: {}\n",
                    i + 1,
                    hit.title,
                    hit.url,
                    hit.content.trim()
                )
            })
            .collect();

        truncate_chars(&entries.join("\n---\n"), self.max_chars).to_string()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for recent or general information that is not in the uploaded documents. \
         Returns ranked results with titles, URLs, and content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        debug!(query = %query, "Running web search");

        match self.provider.search(query, self.max_results).await {
            Ok(hits) if hits.is_empty() => Ok(ToolResult::ok(NO_RESULTS)),
            Ok(hits) => Ok(ToolResult::ok(self.format_hits(&hits))),
            Err(e) => {
                error!(error = %e, "Web search failed");
                Ok(ToolResult::failed(SEARCH_FAILED))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct FixedSearch(Result<Vec<SearchHit>, String>);

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>, ToolError> {
            self.0.clone().map_err(|reason| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason,
            })
        }
    }

    fn hit(title: &str, score: f32) -> SearchHit {
        SearchHit {
            title: title.into(),
            url: format!("https://{title}.example"),
            content: format!("  about {title}  "),
            score,
        }
    }

    fn tool(result: Result<Vec<SearchHit>, String>) -> WebSearchTool {
        WebSearchTool::new(Arc::new(FixedSearch(result)), &SearchConfig::default())
    }

    async fn run(tool: &WebSearchTool) -> ToolResult {
        tool.execute(serde_json::json!({"query": "rust"}), &ToolContext::new("s1"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn low_scores_are_skipped_but_numbering_kept() {
        let result = run(&tool(Ok(vec![hit("a", 0.9), hit("b", 0.1), hit("c", 0.5)]))).await;
        assert!(result.success);
        assert_eq!(
            result.output,
            "[1] Source: a\nURL: https://a.example\nContent: about a\n\
             \n---\n\
             [3] Source: c\nURL: https://c.example\nContent: about c\n"
        );
    }

    #[tokio::test]
    async fn empty_results_message() {
        let result = run(&tool(Ok(vec![]))).await;
        assert_eq!(result.output, NO_RESULTS);
    }

    #[tokio::test]
    async fn provider_failure_becomes_text() {
        let result = run(&tool(Err("boom".into()))).await;
        assert!(!result.success);
        assert_eq!(result.output, SEARCH_FAILED);
    }

    #[tokio::test]
    async fn output_is_truncated() {
        let mut big = hit("big", 0.9);
        big.content = "x".repeat(20_000);
        let result = run(&tool(Ok(vec![big]))).await;
        assert_eq!(result.output.chars().count(), 7000);
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let err = tool(Ok(vec![]))
            .execute(serde_json::json!({}), &ToolContext::new("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn tavily_client_posts_search_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let body = r#"{"results":[{"title":"Rust","url":"https://rust-lang.org","content":"A language","score":0.8}]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });

        let config = SearchConfig {
            api_key: Some("tvly-test".into()),
            api_url: format!("http://{addr}"),
            ..SearchConfig::default()
        };
        let client = TavilyClient::new(&config, reqwest::Client::new());
        let hits = client.search("rust", 3).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /search"));
        assert!(request.to_lowercase().contains("authorization: bearer tvly-test"));
    }

    #[tokio::test]
    async fn tavily_without_key_fails() {
        let client = TavilyClient::new(&SearchConfig::default(), reqwest::Client::new());
        assert!(client.search("rust", 3).await.is_err());
    }
}
