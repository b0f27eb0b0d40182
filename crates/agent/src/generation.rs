//! A provider bound to one model and sampling setup.

use std::sync::Arc;

use docchat_config::ModelsConfig;
use docchat_core::error::ProviderError;
use docchat_core::message::Message;
use docchat_core::provider::{
    Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolChoice, ToolDefinition,
};
use tokio::sync::mpsc;

/// Thin wrapper that builds `ProviderRequest`s for a fixed model.
///
/// The orchestrator holds three of these: chat (router + responder),
/// tool (selection + reflect) and summary.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// The chat, tool and summary clients described by `models`.
    pub fn from_models(provider: Arc<dyn Provider>, models: &ModelsConfig) -> (Self, Self, Self) {
        let chat = Self::new(provider.clone(), &models.chat_model, models.chat_temperature)
            .with_max_tokens(models.max_tokens);
        let tool = Self::new(provider.clone(), &models.tool_model, models.tool_temperature)
            .with_max_tokens(models.max_tokens);
        let summary = Self::new(provider, &models.summary_model, models.summary_temperature)
            .with_max_tokens(models.max_tokens);
        (chat, tool, summary)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }

    /// Plain completion, no tools bound.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.provider.complete(self.request(messages)).await
    }

    /// Completion with `tools` bound under the given policy.
    pub async fn complete_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        choice: ToolChoice,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut request = self.request(messages);
        request.tools = tools;
        request.tool_choice = choice;
        self.provider.complete(request).await
    }

    /// Streaming completion, no tools bound.
    pub async fn stream(
        &self,
        messages: Vec<Message>,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let mut request = self.request(messages);
        request.stream = true;
        self.provider.stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;

    #[tokio::test]
    async fn requests_carry_model_settings() {
        let provider = Arc::new(ScriptedProvider::replies(["ok", "ok"]));
        let client = GenerationClient::new(provider.clone(), "tool-model", 0.0).with_max_tokens(64);

        client.complete(vec![Message::human("hi")]).await.unwrap();
        client
            .complete_with_tools(vec![Message::human("hi")], vec![], ToolChoice::Required)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].model, "tool-model");
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_tokens, Some(64));
        assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
        assert_eq!(requests[1].tool_choice, ToolChoice::Required);
    }

    #[test]
    fn from_models_splits_roles() {
        let provider = Arc::new(ScriptedProvider::replies(Vec::<&str>::new()));
        let (chat, tool, summary) = GenerationClient::from_models(provider, &ModelsConfig::default());
        assert_eq!(chat.model(), "llama-3.3-70b-versatile");
        assert_eq!(tool.model(), "llama-3.3-70b-versatile");
        assert_eq!(summary.model(), "llama-3.1-8b-instant");
        assert!(tool.temperature.abs() < f32::EPSILON);
    }
}
