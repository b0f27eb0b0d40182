//! Document store trait — the session-scoped retrieval index.
//!
//! Ingestion appends text chunks per session; the `document_search` tool
//! ranks them against a query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// A chunk of ingested text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub session_id: String,

    /// File name or URL the text came from
    pub source: String,

    pub text: String,

    /// Position of the chunk within its source
    pub chunk_index: usize,
}

/// A ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,

    /// Relevance in `0.0..=1.0`, higher is better
    pub score: f32,
}

/// Implementations: in-memory keyword overlap, PostgreSQL.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &str;

    /// Best `limit` chunks of `session_id` for `query`, highest score first.
    async fn vector_search(
        &self,
        query: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Append chunks; returns the number stored.
    async fn append_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError>;

    /// Distinct sources ingested for a session, in first-ingested order.
    async fn sources(&self, session_id: &str) -> Result<Vec<String>, StoreError>;
}
