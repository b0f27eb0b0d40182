//! In-memory stores — useful for testing and single-process runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use docchat_core::document::{DocumentChunk, DocumentStore, RetrievedChunk};
use docchat_core::error::StoreError;
use docchat_core::message::Message;
use docchat_core::session::{Session, SessionStore};
use tokio::sync::RwLock;

/// Sessions keyed by id.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert_session(
        &self,
        session_id: &str,
        owner: Option<&str>,
    ) -> Result<Session, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, owner.map(str::to_string)));
        Ok(session.clone())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save_turn(
        &self,
        session_id: &str,
        summary: &str,
        retained: &[Message],
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, None));
        session.summary = summary.to_string();
        session.retained_messages = retained.to_vec();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_sessions(&self, owner: &str, session_ids: &[String]) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut claimed = 0;
        for id in session_ids {
            if let Some(session) = sessions.get_mut(id) {
                if session.owner.is_none() {
                    session.owner = Some(owner.to_string());
                    session.updated_at = Utc::now();
                    claimed += 1;
                }
            }
        }
        Ok(claimed)
    }

    async fn list_sessions(&self, owner: &str) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut owned: Vec<Session> = sessions
            .values()
            .filter(|s| s.owner.as_deref() == Some(owner))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(owned)
    }
}

/// Lower-cased alphanumeric query terms, deduplicated in order.
pub(crate) fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
    {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Chunks per session, scored by the fraction of query terms they contain.
pub struct InMemoryDocumentStore {
    chunks: Arc<RwLock<Vec<DocumentChunk>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn vector_search(
        &self,
        query: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().await;
        let mut results: Vec<RetrievedChunk> = chunks
            .iter()
            .filter(|c| c.session_id == session_id)
            .filter_map(|c| {
                let text = c.text.to_lowercase();
                let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (matched > 0).then(|| RetrievedChunk {
                    text: c.text.clone(),
                    source: c.source.clone(),
                    score: matched as f32 / terms.len() as f32,
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    async fn append_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError> {
        let count = chunks.len();
        self.chunks.write().await.extend(chunks);
        Ok(count)
    }

    async fn sources(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        let chunks = self.chunks.read().await;
        let mut sources: Vec<String> = Vec::new();
        for chunk in chunks.iter().filter(|c| c.session_id == session_id) {
            if !sources.contains(&chunk.source) {
                sources.push(chunk.source.clone());
            }
        }
        Ok(sources)
    }
}
