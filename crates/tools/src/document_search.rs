//! Document search tool — queries the chunks ingested for the current session.

use std::sync::Arc;

use async_trait::async_trait;
use docchat_core::document::DocumentStore;
use docchat_core::error::ToolError;
use docchat_core::tool::{Tool, ToolContext, ToolResult};
use tracing::{debug, error};

const NO_MATCHES: &str = "No relevant information found from the uploaded pdf(s)/youtube link(s).";
const SEARCH_FAILED: &str = "Error searching internal documents.";

pub struct DocumentSearchTool {
    store: Arc<dyn DocumentStore>,
    limit: usize,
    min_score: f32,
}

impl DocumentSearchTool {
    pub fn new(store: Arc<dyn DocumentStore>, limit: usize, min_score: f32) -> Self {
        Self { store, limit, min_score }
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        "document_search"
    }

    fn description(&self) -> &str {
        "Search the PDFs, transcripts and YouTube links uploaded to this chat session. \
         Use this first for any question about the user's own documents."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in the uploaded documents"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let chunks = match self.store.vector_search(query, &ctx.session_id, self.limit).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!(session_id = %ctx.session_id, error = %e, "Document search failed");
                return Ok(ToolResult::failed(SEARCH_FAILED));
            }
        };

        let formatted: Vec<String> = chunks
            .iter()
            .filter(|c| c.score >= self.min_score)
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "--- Document Chunk {} (Relevance: {:.3}) ---\nSource: {}\nContent: {}",
                    i + 1,
                    c.score,
                    c.source,
                    c.text.trim()
                )
            })
            .collect();

        debug!(
            session_id = %ctx.session_id,
            hits = chunks.len(),
            kept = formatted.len(),
            "Document search finished"
        );

        if formatted.is_empty() {
            return Ok(ToolResult::ok(NO_MATCHES));
        }
        Ok(ToolResult::ok(formatted.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::document::{DocumentChunk, RetrievedChunk};
    use docchat_core::error::StoreError;
    use std::sync::Mutex;

    struct FixedStore {
        hits: Result<Vec<RetrievedChunk>, StoreError>,
        seen_session: Mutex<Option<String>>,
    }

    #[async_trait]
    impl DocumentStore for FixedStore {
        fn name(&self) -> &str { "fixed" }

        async fn vector_search(
            &self,
            _q: &str,
            session_id: &str,
            limit: usize,
        ) -> Result<Vec<RetrievedChunk>, StoreError> {
            *self.seen_session.lock().unwrap() = Some(session_id.to_string());
            self.hits.clone().map(|mut h| {
                h.truncate(limit);
                h
            })
        }

        async fn append_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError> {
            Ok(chunks.len())
        }

        async fn sources(&self, _session_id: &str) -> Result<Vec<String>, StoreError> {
            Ok(vec![])
        }
    }

    fn chunk(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk { text: text.into(), source: "notes.pdf".into(), score }
    }

    fn tool(
        hits: Result<Vec<RetrievedChunk>, StoreError>) -> (DocumentSearchTool, Arc<FixedStore>,
    ) {
        let store = Arc::new(FixedStore { hits, seen_session: Mutex::new(None) });
        (DocumentSearchTool::new(store.clone(), 6, 0.4), store)
    }

    async fn run(tool: &DocumentSearchTool) -> ToolResult {
        tool.execute(serde_json::json!({"query": "ownership"}), &ToolContext::new("session-7"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn formats_chunks_above_threshold() {
        let (tool, store) = tool(Ok(vec![chunk(" first ", 0.91234), chunk("weak", 0.2), chunk("second", 0.5)]));
        let result = run(&tool).await;

        assert!(result.success);
        assert_eq!(
            result.output,
            "--- Document Chunk 1 (Relevance: 0.912) ---\nSource: notes.pdf\nContent: first\n\n\
             --- Document Chunk 2 (Relevance: 0.500) ---\nSource: notes.pdf\nContent: second"
        );
        assert_eq!(store.seen_session.lock().unwrap().as_deref(), Some("session-7"));
    }

    #[tokio::test]
    async fn nothing_relevant_message() {
        let (tool, _) = tool(Ok(vec![chunk("weak", 0.1)]));
        assert_eq!(run(&tool).await.output, NO_MATCHES);
    }

    #[tokio::test]
    async fn store_failure_becomes_text() {
        let (tool, _) = tool(Err(StoreError::Unavailable("down".into())));
        let result = run(&tool).await;
        assert!(!result.success);
        assert_eq!(result.output, SEARCH_FAILED);
    }
}
