//! Provider registry — builds and holds the configured LLM providers.
//!
//! Every configured provider speaks the OpenAI chat-completions dialect;
//! they differ only in base URL and key.

use std::collections::HashMap;
use std::sync::Arc;
use docchat_core::error::ProviderError;
use docchat_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Holds the providers by name, with one marked as default.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRegistry {
    /// Create an empty registry with a default provider name.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }
}

/// Build providers from configuration.
///
/// The default provider is always registered, even when it has no
/// `[providers.<name>]` section.
pub fn build_from_config(
    config: &docchat_config::AppConfig,
) -> Result<ProviderRegistry, ProviderError> {
    let mut registry = ProviderRegistry::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .map(Ok)
            .unwrap_or_else(|| default_base_url(name))?;

        let provider = OpenAiCompatProvider::new(name, &base_url, &api_key)?;
        registry.register(name.clone(), Arc::new(provider));
    }

    if registry.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider)?;
        let provider = OpenAiCompatProvider::new(&config.default_provider, &base_url, &api_key)?;
        registry.register(config.default_provider.clone(), Arc::new(provider));
    }

    Ok(registry)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> Result<String, ProviderError> {
    let url = match provider_name {
        "groq" => "https://api.groq.com/openai/v1",
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "together" => "https://api.together.xyz/v1",
        "fireworks" => "https://api.fireworks.ai/inference/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "vllm" => "http://localhost:8000/v1",
        other => {
            return Err(ProviderError::NotConfigured(format!(
                "no api_url configured for provider '{other}'"
            )));
        }
    };
    Ok(url.into())
}
