//! Session and document stores for docchat.
//!
//! Two backends implement the core `SessionStore` / `DocumentStore` traits:
//! an in-memory one (tests, single-process demos) and PostgreSQL behind the
//! `postgres` feature. `ingest` turns plain text into stored chunks.

pub mod in_memory;
pub mod ingest;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use docchat_config::StorageConfig;
use docchat_core::document::DocumentStore;
use docchat_core::error::StoreError;
use docchat_core::session::SessionStore;

pub use in_memory::{InMemoryDocumentStore, InMemorySessionStore};
pub use ingest::{TextIngestor, chunk_text};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresDocumentStore, PostgresSessionStore};

/// The pair of stores a running service needs.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionStore::new()),
            documents: Arc::new(InMemoryDocumentStore::new()),
        }
    }
}

/// Open the configured backend. PostgreSQL connections run the schema
/// migration before returning.
pub async fn connect(config: &StorageConfig) -> Result<Stores, StoreError> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("Using in-memory session and document stores");
            Ok(Stores::in_memory())
        }
        "postgres" => connect_postgres(config).await,
        other => Err(StoreError::Unavailable(format!("unknown storage backend '{other}'"))),
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &StorageConfig) -> Result<Stores, StoreError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| StoreError::Unavailable("storage.database_url is not set".into()))?;

    let pool = postgres::connect_pool(url, config.max_connections).await?;
    let sessions = PostgresSessionStore::from_pool(pool.clone());
    sessions.migrate().await?;

    Ok(Stores {
        sessions: Arc::new(sessions),
        documents: Arc::new(PostgresDocumentStore::from_pool(pool)),
    })
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &StorageConfig) -> Result<Stores, StoreError> {
    Err(StoreError::Unavailable(
        "docchat-store was built without the `postgres` feature".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_connects() {
        let stores = connect(&StorageConfig::default()).await.unwrap();
        assert_eq!(stores.sessions.name(), "memory");
        assert_eq!(stores.documents.name(), "memory");
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let config = StorageConfig {
            backend: "redis".into(),
            ..StorageConfig::default()
        };
        assert!(connect(&config).await.is_err());
    }
}
