//! Session trait — persisted per-conversation state.
//!
//! A session carries what survives between turns: the running summary and
//! the last question/answer pair. Sessions are created lazily on first use
//! and never deleted by the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::StoreError;
use crate::message::Message;

/// Persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,

    /// Owning identity; `None` means a guest session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Condensed running summary of older dialogue
    #[serde(default)]
    pub summary: String,

    /// At most the latest human message and the latest assistant answer
    #[serde(default)]
    pub retained_messages: Vec<Message>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            owner,
            summary: String::new(),
            retained_messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `identity` may use this session. Guest sessions are open to
    /// everyone; owned sessions only to their owner.
    pub fn accessible_by(&self, identity: Option<&str>) -> bool {
        match self.owner.as_deref() {
            None => true,
            Some(owner) => identity == Some(owner),
        }
    }
}

/// The session store abstraction.
///
/// Implementations: in-memory (tests, single process), PostgreSQL.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "memory", "postgres").
    fn name(&self) -> &str;

    /// Create the session if absent and return it. `owner` is recorded only
    /// on creation; an existing session keeps its owner.
    async fn upsert_session(
        &self,
        session_id: &str,
        owner: Option<&str>,
    ) -> Result<Session, StoreError>;

    /// Fetch a session.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Owner of a session, `None` for guests or unknown sessions.
    async fn get_session_owner(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_session(session_id).await?.and_then(|s| s.owner))
    }

    /// Persist the outcome of a completed turn.
    async fn save_turn(
        &self,
        session_id: &str,
        summary: &str,
        retained: &[Message],
    ) -> Result<(), StoreError>;

    /// Attach guest sessions to `owner`. Sessions that already have an owner
    /// are left untouched. Returns how many were claimed.
    async fn claim_sessions(&self, owner: &str, session_ids: &[String]) -> Result<u64, StoreError>;

    /// Sessions owned by `owner`, most recently updated first.
    async fn list_sessions(&self, owner: &str) -> Result<Vec<Session>, StoreError>;
}
