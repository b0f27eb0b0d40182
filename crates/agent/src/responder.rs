//! Final answer generation, blocking or token-streamed.

use docchat_core::message::{Message, Role};
use tracing::debug;

use crate::dispatch::ensure_answered;
use crate::error::TurnError;
use crate::generation::GenerationClient;
use crate::prompts;
use crate::state::ConversationState;
use crate::stream_event::EventSink;

/// What the responder produced.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
}

pub struct Responder {
    client: GenerationClient,
    window: usize,
}

impl Responder {
    pub fn new(client: GenerationClient, window: usize) -> Self {
        Self { client, window: window.max(1) }
    }

    /// Build the responder request: system prompt (summary + tool results in
    /// the window) followed by the dialogue messages of the window. The
    /// window always reaches back to the latest human message.
    pub fn build_messages(&self, state: &ConversationState) -> Vec<Message> {
        let mut start = state.messages.len().saturating_sub(self.window);
        if let Some(human) = state.last_human_index() {
            start = start.min(human);
        }
        let window = &state.messages[start..];

        let retrieved = prompts::render_tool_results(
            window.iter().filter(|m| m.role == Role::Tool).map(|m| {
                let name = m
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| state.tool_name_for(id))
                    .unwrap_or("tool");
                (name, m.content.as_str())
            }),
        );

        let mut messages = vec![Message::system(prompts::chatbot_prompt(&state.summary, &retrieved))];
        messages.extend(
            window
                .iter()
                .filter(|m| m.role == Role::Human || m.is_assistant_text())
                .cloned(),
        );
        messages
    }

    /// Generate the answer and append it to the state. Streaming sinks get
    /// every non-empty fragment as a `token` event.
    pub async fn respond(
        &self,
        state: &mut ConversationState,
        sink: &EventSink,
    ) -> Result<GeneratedAnswer, TurnError> {
        ensure_answered(state)?;
        let messages = self.build_messages(state);

        let answer = if sink.is_streaming() {
            self.stream_answer(messages, sink).await?
        } else {
            let response = self.client.complete(messages).await?;
            GeneratedAnswer {
                content: response.message.content,
                model: response.model,
                tokens_used: response.usage.map(|u| u.total_tokens).unwrap_or(0),
            }
        };

        debug!(
            session_id = %state.session_id,
            chars = answer.content.len(),
            tokens = answer.tokens_used,
            "Response generated"
        );
        state.messages.push(Message::assistant(&answer.content));
        Ok(answer)
    }

    async fn stream_answer(
        &self,
        messages: Vec<Message>,
        sink: &EventSink,
    ) -> Result<GeneratedAnswer, TurnError> {
        let mut rx = self.client.stream(messages).await?;
        let mut content = String::new();
        let mut tokens_used = 0;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(fragment) = chunk.content.filter(|f| !f.is_empty()) {
                content.push_str(&fragment);
                sink.token(fragment).await?;
            }
            if let Some(usage) = chunk.usage {
                tokens_used = usage.total_tokens;
            }
            if chunk.done {
                break;
            }
        }

        Ok(GeneratedAnswer {
            content,
            model: self.client.model().to_string(),
            tokens_used,
        })
    }
}
