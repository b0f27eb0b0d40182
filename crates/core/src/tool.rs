//! Tool trait — the abstraction over retrieval capabilities.
//!
//! Tools are what let a turn reach beyond the model: search the session's
//! uploaded documents, search the web, scrape a page.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use crate::error::ToolError;
use crate::message::{Message, MessageToolCall};
use crate::provider::ToolDefinition;

/// A request to execute a tool, with arguments already parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl TryFrom<&MessageToolCall> for ToolCall {
    type Error = ToolError;

    fn try_from(call: &MessageToolCall) -> Result<Self, Self::Error> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw)
                .map_err(|e| ToolError::InvalidArguments(format!("{}: {e}", call.name)))?
        };
        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }
}

/// Per-turn context handed to every tool execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The session the current turn belongs to
    pub session_id: String,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into() }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (what the model reads)
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into() }
    }

    /// A handled failure whose text is still shown to the model.
    pub fn failed(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into() }
    }
}

/// One executed tool call. Converted straight into a tool-result message.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub result_text: String,
    pub succeeded: bool,
}

impl ToolInvocation {
    pub fn into_message(self) -> Message {
        Message::tool_result(self.call_id, self.result_text)
    }
}

/// The core Tool trait.
///
/// Each adapter (document_search, web_search, web_scrape) implements this
/// trait. Tools are registered in the ToolRegistry and offered to the
/// tool-selection model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (what the model sees).
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The dispatch loop uses this to:
/// 1. Get tool definitions to bind to the tool-selection call
/// 2. Run the calls the model requested
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute an already-parsed tool call.
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.tools.get(&call.name).ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone(), ctx).await
    }

    /// Run a model-issued tool call. Never fails: unknown tools, malformed
    /// arguments, adapter errors and adapter panics all become error text.
    pub async fn invoke(&self, call: &MessageToolCall, ctx: &ToolContext) -> ToolInvocation {
        let outcome = match ToolCall::try_from(call) {
            Ok(parsed) => AssertUnwindSafe(self.execute(&parsed, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    tracing::error!(tool = %call.name, "Tool panicked during execution");
                    Err(ToolError::ExecutionFailed {
                        tool_name: call.name.clone(),
                        reason: "the tool crashed".into(),
                    })
                }),
            Err(e) => Err(e),
        };

        let (result_text, succeeded) = match outcome {
            Ok(result) => (result.output, result.success),
            Err(ToolError::NotFound(name)) => (format!("Error: unknown tool '{name}'"), false),
            Err(e) => (format!("Error: {e}"), false),
        };

        ToolInvocation {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            result_text,
            succeeded,
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes the `text` argument prefixed with the session id.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            ctx: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(ToolResult::ok(format!("{}:{text}", ctx.session_id)))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str { "boom" }
        fn description(&self) -> &str { "Always panics" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<ToolResult, ToolError> {
            panic!("adapter bug");
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(PanicTool));
        registry
    }

    fn call(name: &str, arguments: &str) -> MessageToolCall {
        MessageToolCall { id: "call_1".into(), name: name.into(), arguments: arguments.into() }
    }

    #[test]
    fn registry_definitions_are_sorted() {
        let defs = registry().definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["boom", "echo"]);
    }

    #[tokio::test]
    async fn invoke_passes_session_context() {
        let ctx = ToolContext::new("s1");
        let inv = registry().invoke(&call("echo", r#"{"text":"hello"}"#), &ctx).await;
        assert!(inv.succeeded);
        assert_eq!(inv.result_text, "s1:hello");
        assert_eq!(inv.call_id, "call_1");

        let msg = inv.into_message();
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn invoke_unknown_tool_becomes_text() {
        let inv = registry().invoke(&call("nonexistent", "{}"), &ToolContext::new("s1")).await;
        assert!(!inv.succeeded);
        assert_eq!(inv.result_text, "Error: unknown tool 'nonexistent'");
    }

    #[tokio::test]
    async fn invoke_malformed_arguments_becomes_text() {
        let inv = registry().invoke(&call("echo", "{not json"), &ToolContext::new("s1")).await;
        assert!(!inv.succeeded);
        assert!(inv.result_text.starts_with("Error: Invalid tool arguments"));
    }

    #[tokio::test]
    async fn invoke_adapter_error_becomes_text() {
        let inv = registry().invoke(&call("echo", "{}"), &ToolContext::new("s1")).await;
        assert!(!inv.succeeded);
        assert!(inv.result_text.contains("missing 'text'"));
    }

    #[tokio::test]
    async fn invoke_contains_panics() {
        let inv = registry().invoke(&call("boom", ""), &ToolContext::new("s1")).await;
        assert!(!inv.succeeded);
        assert!(inv.result_text.contains("crashed"));
    }
}
