//! Shared test helpers for orchestration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docchat_core::error::{ProviderError, ToolError};
use docchat_core::message::{Message, MessageToolCall};
use docchat_core::provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
use docchat_core::tool::{Tool, ToolContext, ToolResult};

/// One scripted provider reaction.
pub enum Scripted {
    Reply(ProviderResponse),
    Fail(ProviderError),
    /// Streamed as separate fragments; `complete` returns them joined.
    Stream(Vec<String>),
    /// Wait before answering with text.
    Slow(Duration, String),
}

/// A provider that plays back a script and records every request.
///
/// Once the script runs out, calls fail with an `ApiError`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A script of plain text replies.
    pub fn replies<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(texts.into_iter().map(|t| text(t.as_ref())).collect())
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ProviderRequest) -> Option<Scripted> {
        self.requests.lock().unwrap().push(request);
        self.script.lock().unwrap().pop_front()
    }
}

fn exhausted() -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message: "script exhausted".into(),
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match self.next(request) {
            Some(Scripted::Reply(response)) => Ok(response),
            Some(Scripted::Fail(e)) => Err(e),
            Some(Scripted::Stream(parts)) => Ok(response(Message::assistant(parts.concat()))),
            Some(Scripted::Slow(delay, answer)) => {
                tokio::time::sleep(delay).await;
                Ok(response(Message::assistant(answer)))
            }
            None => Err(exhausted()),
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let parts = match self.next(request) {
            Some(Scripted::Stream(parts)) => parts,
            Some(Scripted::Reply(response)) => vec![response.message.content],
            Some(Scripted::Slow(delay, answer)) => {
                tokio::time::sleep(delay).await;
                vec![answer]
            }
            Some(Scripted::Fail(e)) => return Err(e),
            None => return Err(exhausted()),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(parts.len() + 1);
        tokio::spawn(async move {
            for part in parts {
                let chunk = StreamChunk {
                    content: Some(part),
                    ..StreamChunk::default()
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    done: true,
                    ..StreamChunk::default()
                }))
                .await;
        });
        Ok(rx)
    }
}

pub fn response(message: Message) -> ProviderResponse {
    ProviderResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// A plain text reply.
pub fn text(content: &str) -> Scripted {
    Scripted::Reply(response(Message::assistant(content)))
}

/// A reply requesting the given tool calls.
pub fn tool_calls(calls: Vec<MessageToolCall>) -> Scripted {
    Scripted::Reply(response(Message::assistant_tool_calls("", calls)))
}

pub fn call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

/// A tool that answers with fixed text after an optional delay and counts
/// its invocations.
pub struct StaticTool {
    name: String,
    output: String,
    delay: Duration,
    calls: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl StaticTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: output.to_string(),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<serde_json::Value>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns fixed text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        self.calls.lock().unwrap().push(arguments);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(ToolResult::ok(&self.output))
    }
}
