//! Process-wide wiring: provider, stores, tools and the orchestrator.

use std::sync::Arc;

use docchat_config::AppConfig;
use docchat_core::document::DocumentStore;
use docchat_core::error::{Error, ProviderError};
use docchat_core::event::EventBus;
use docchat_core::provider::Provider;
use docchat_core::session::SessionStore;
use docchat_core::tool::ToolRegistry;
use docchat_store::{Stores, TextIngestor};
use tracing::info;

use crate::orchestrator::Orchestrator;

/// Everything the gateway and the CLI need, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub ingestor: Arc<TextIngestor>,
    pub event_bus: Arc<EventBus>,
}

impl Services {
    /// Assemble services from already-built parts.
    pub fn from_parts(
        provider: Arc<dyn Provider>,
        stores: Stores,
        tools: ToolRegistry,
        config: &AppConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(256));
        let orchestrator = Orchestrator::new(
            provider,
            Arc::new(tools),
            stores.sessions.clone(),
            event_bus.clone(),
            config,
        );

        Self {
            orchestrator: Arc::new(orchestrator),
            ingestor: Arc::new(TextIngestor::new(stores.documents.clone(), &config.documents)),
            sessions: stores.sessions,
            documents: stores.documents,
            event_bus,
        }
    }
}

/// Build services from configuration: the default provider, the configured
/// storage backend and the three retrieval tools sharing one HTTP client.
pub async fn build_services(config: &AppConfig) -> Result<Services, Error> {
    let providers = docchat_providers::build_from_config(config)?;
    let provider = providers.default_provider().ok_or_else(|| {
        ProviderError::NotConfigured(format!("default provider '{}' is not registered", config.default_provider))
    })?;

    let stores = docchat_store::connect(&config.storage).await?;
    let client = docchat_tools::http_client(&config.scrape)?;
    let tools = docchat_tools::registry_from_config(config, stores.documents.clone(), client);

    info!(
        provider = %provider.name(),
        chat_model = %config.models.chat_model,
        storage = %stores.sessions.name(),
        tools = ?tools.names(),
        "Services ready"
    );

    Ok(Services::from_parts(provider, stores, tools, config))
}
