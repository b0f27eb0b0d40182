//! PostgreSQL session and document stores.
//!
//! Both stores share one pool. Sessions live in `chat_sessions`, with the
//! retained messages kept as a JSON text column. Document chunks live in
//! `document_chunks` and are ranked with `ILIKE` term scoring.
//!
//! Run [`PostgresSessionStore::migrate`] once before use; it applies
//! `migrations/001_create_sessions.sql`, which is idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};

use docchat_core::document::{DocumentChunk, DocumentStore, RetrievedChunk};
use docchat_core::error::StoreError;
use docchat_core::message::Message;
use docchat_core::session::{Session, SessionStore};

use crate::in_memory::query_terms;

/// Open a connection pool.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("PostgreSQL connection failed: {e}")))?;

    info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

const SESSION_COLUMNS: &str = "session_id, owner, summary, retained_messages, created_at, updated_at";

pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the schema migration.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let migration_sql = include_str!("../migrations/001_create_sessions.sql");

        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        info!("Session schema migration complete");
        Ok(())
    }
}

fn row_to_session(row: &PgRow) -> Result<Session, StoreError> {
    let column = |e: sqlx::Error| StoreError::Corrupt(e.to_string());

    let session_id: String = row.try_get("session_id").map_err(column)?;
    let retained: String = row.try_get("retained_messages").map_err(column)?;
    let retained_messages: Vec<Message> = serde_json::from_str(&retained)
        .map_err(|e| StoreError::Corrupt(format!("session {session_id}: {e}")))?;

    Ok(Session {
        owner: row.try_get("owner").map_err(column)?,
        summary: row.try_get("summary").map_err(column)?,
        retained_messages,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(column)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(column)?,
        session_id,
    })
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn upsert_session(
        &self,
        session_id: &str,
        owner: Option<&str>,
    ) -> Result<Session, StoreError> {
        sqlx::query(
            "INSERT INTO chat_sessions (session_id, owner) VALUES ($1, $2) \
             ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Failed to upsert session: {e}")))?;

        self.get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("session {session_id} vanished after upsert")))
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE session_id = $1");
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Failed to load session: {e}")))?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn save_turn(
        &self,
        session_id: &str,
        summary: &str,
        retained: &[Message],
    ) -> Result<(), StoreError> {
        let retained_json =
            serde_json::to_string(retained).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            "INSERT INTO chat_sessions (session_id, summary, retained_messages) VALUES ($1, $2, $3) \
             ON CONFLICT (session_id) DO UPDATE SET \
               summary = EXCLUDED.summary, \
               retained_messages = EXCLUDED.retained_messages, \
               updated_at = now()",
        )
        .bind(session_id)
        .bind(summary)
        .bind(&retained_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Failed to save turn: {e}")))?;

        debug!(session_id = %session_id, retained = retained.len(), "Saved session state");
        Ok(())
    }

    async fn claim_sessions(&self, owner: &str, session_ids: &[String]) -> Result<u64, StoreError> {
        if session_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE chat_sessions SET owner = $1, updated_at = now() \
             WHERE session_id = ANY($2) AND owner IS NULL",
        )
        .bind(owner)
        .bind(session_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Failed to claim sessions: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn list_sessions(&self, owner: &str) -> Result<Vec<Session>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE owner = $1 ORDER BY updated_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Failed to list sessions: {e}")))?;

        rows.iter().map(row_to_session).collect()
    }
}

pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ranking query for `term_count` terms. `$1` is the session id, the
    /// terms follow, and the last placeholder is the limit.
    fn search_sql(term_count: usize) -> String {
        let score_parts: Vec<String> = (0..term_count)
            .map(|i| format!("CASE WHEN text ILIKE '%' || ${} || '%' THEN 1.0 ELSE 0.0 END", i + 2))
            .collect();
        let where_parts: Vec<String> = (0..term_count)
            .map(|i| format!("text ILIKE '%' || ${} || '%'", i + 2))
            .collect();

        format!(
            "SELECT text, source, (({}) / {}.0)::REAL AS score \
             FROM document_chunks \
             WHERE session_id = $1 AND ({}) \
             ORDER BY score DESC, id ASC \
             LIMIT ${}",
            score_parts.join(" + "),
            term_count,
            where_parts.join(" OR "),
            term_count + 2,
        )
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    fn name(&self) -> &str {
        "postgres"
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

        let sql = Self::search_sql(terms.len());
        let mut qb = sqlx::query(&sql).bind(session_id);
        for term in &terms {
            qb = qb.bind(term);
        }
        qb = qb.bind(limit as i64);

        let rows = qb
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Document search failed: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(RetrievedChunk {
                    text: row.try_get("text").map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    source: row.try_get("source").map_err(|e| StoreError::Corrupt(e.to_string()))?,
                    score: row.try_get("score").map_err(|e| StoreError::Corrupt(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn append_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<usize, StoreError> {
        let failed = |e: sqlx::Error| StoreError::QueryFailed(format!("Failed to store chunks: {e}"));

        let mut tx = self.pool.begin().await.map_err(failed)?;
        for chunk in &chunks {
            sqlx::query(
                "INSERT INTO document_chunks (session_id, source, chunk_index, text) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&chunk.session_id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index as i32)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        }
        tx.commit().await.map_err(failed)?;

        Ok(chunks.len())
    }

    async fn sources(&self, session_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT source FROM document_chunks WHERE session_id = $1 \
             GROUP BY source ORDER BY MIN(id)",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Failed to list sources: {e}")))?;

        rows.iter()
            .map(|row| row.try_get("source").map_err(|e| StoreError::Corrupt(e.to_string())))
            .collect()
    }
}

// ── Unit tests (no DB required) ──────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_sql_numbers_placeholders() {
        let sql = PostgresDocumentStore::search_sql(2);
        assert!(sql.contains("session_id = $1"));
        assert!(sql.contains("ILIKE '%' || $2 || '%'"));
        assert!(sql.contains("ILIKE '%' || $3 || '%'"));
        assert!(sql.contains("/ 2.0"));
        assert!(sql.ends_with("LIMIT $4"));
    }

    #[test]
    fn search_sql_single_term() {
        let sql = PostgresDocumentStore::search_sql(1);
        assert!(!sql.contains(" OR "));
        assert!(sql.ends_with("LIMIT $3"));
    }

    #[test]
    fn migration_creates_both_tables() {
        let sql = include_str!("../migrations/001_create_sessions.sql");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS chat_sessions"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS document_chunks"));
    }

    #[test]
    fn retained_messages_column_round_trips() {
        let retained = vec![Message::human("q"), Message::assistant("a")];
        let json = serde_json::to_string(&retained).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, retained);
    }
}
