//! The bounded tool loop: select tools, run them concurrently, reflect.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use docchat_core::event::{DomainEvent, EventBus};
use docchat_core::message::{Message, MessageToolCall, Role};
use docchat_core::provider::ToolChoice;
use docchat_core::tool::{ToolContext, ToolInvocation, ToolRegistry};
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TurnError;
use crate::generation::GenerationClient;
use crate::prompts;
use crate::state::{ConversationState, Route};
use crate::stream_event::EventSink;

pub struct ToolDispatcher {
    client: GenerationClient,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    max_iterations: u32,
}

impl ToolDispatcher {
    pub fn new(
        client: GenerationClient,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        max_iterations: u32,
    ) -> Self {
        Self {
            client,
            tools,
            event_bus,
            max_iterations,
        }
    }

    /// One dispatch step. Leaves `state.route` at `Tools` (go again) or `End`.
    pub async fn step(
        &self,
        state: &mut ConversationState,
        sink: &EventSink,
    ) -> Result<(), TurnError> {
        state.tool_iteration_count += 1;
        if state.tool_iteration_count > self.max_iterations {
            warn!(
                session_id = %state.session_id,
                iterations = state.tool_iteration_count - 1,
                "Max tool iterations reached, answering with what was gathered"
            );
            state.route = Route::End;
            return Ok(());
        }

        sink.status("Searching").await?;
        ensure_answered(state)?;

        let mut messages = vec![Message::system(prompts::tool_selection_prompt(&state.summary))];
        messages.extend(state.since_last_human().iter().cloned());

        let response = self
            .client
            .complete_with_tools(messages, self.tools.definitions(), ToolChoice::Required)
            .await?;

        let calls = assign_call_ids(state, response.message.tool_calls);
        if calls.is_empty() {
            return Err(TurnError::ContractViolation(
                "tool selection returned no tool calls".into(),
            ));
        }

        debug!(
            session_id = %state.session_id,
            step = state.tool_iteration_count,
            tool_count = calls.len(),
            "Executing tool calls"
        );

        state
            .messages
            .push(Message::assistant_tool_calls(response.message.content, calls.clone()));

        for call in &calls {
            sink.status(format!("Using {}", call.name)).await?;
        }

        let ctx = ToolContext::new(&state.session_id);
        let invocations = join_all(calls.iter().map(|call| self.run_call(call, &ctx))).await;

        // join_all preserves input order, so results follow call order
        for invocation in invocations {
            state.messages.push(invocation.into_message());
        }

        self.reflect(state).await
    }

    async fn run_call(&self, call: &MessageToolCall, ctx: &ToolContext) -> ToolInvocation {
        let start = Instant::now();
        let invocation = self.tools.invoke(call, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !invocation.succeeded {
            warn!(tool = %call.name, call_id = %call.id, "Tool call failed");
        }
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: invocation.succeeded,
            duration_ms,
            timestamp: Utc::now(),
        });

        invocation
    }

    /// Ask the tool model whether the gathered results answer the question.
    async fn reflect(&self, state: &mut ConversationState) -> Result<(), TurnError> {
        let question = state.last_human().map(|m| m.content.clone()).unwrap_or_default();
        let gathered = prompts::render_tool_results(
            state
                .since_last_human()
                .iter()
                .filter(|m| m.role == Role::Tool)
                .map(|m| {
                    let name = m
                        .tool_call_id
                        .as_deref()
                        .and_then(|id| state.tool_name_for(id))
                        .unwrap_or("tool");
                    (name, m.content.as_str())
                }),
        );

        let reply = self.client.complete(prompts::reflect_messages(&question, &gathered)).await?;

        state.route = match reply.message.content.trim().to_lowercase().as_str() {
            "tools" => Route::Tools,
            _ => Route::End,
        };
        info!(
            session_id = %state.session_id,
            step = state.tool_iteration_count,
            next = %state.route,
            "Tool step finished"
        );
        Ok(())
    }
}

/// Fill in missing ids and ids already used in this step or an earlier one,
/// so every result pairs with exactly one call.
fn assign_call_ids(state: &ConversationState, calls: Vec<MessageToolCall>) -> Vec<MessageToolCall> {
    let mut seen: Vec<String> = state
        .messages
        .iter()
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
        .collect();
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() || seen.contains(&call.id) {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
            seen.push(call.id.clone());
            call
        })
        .collect()
}

/// Refuse to call the model while an assistant tool call lacks its result.
pub(crate) fn ensure_answered(state: &ConversationState) -> Result<(), TurnError> {
    match state.unanswered_tool_calls().into_iter().next() {
        Some(id) => Err(TurnError::UnansweredToolCall(id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::TurnEvent;
    use crate::test_helpers::{ScriptedProvider, StaticTool, call, text, tool_calls};
    use docchat_core::session::Session;
    use tokio::sync::mpsc;

    fn registry() -> Arc<ToolRegistry> {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(StaticTool::new("document_search", "chunk about ownership")));
        tools.register(Box::new(StaticTool::new("web_search", "[1] Source: Rust Blog")));
        Arc::new(tools)
    }

    fn dispatcher(provider: Arc<ScriptedProvider>, bus: Arc<EventBus>, cap: u32) -> ToolDispatcher {
        ToolDispatcher::new(GenerationClient::new(provider, "tool-model", 0.0), registry(), bus, cap)
    }

    fn state() -> ConversationState {
        let mut state = ConversationState::begin(&Session::new("s1", None), "what does my pdf say?");
        state.route = Route::Tools;
        state
    }

    #[tokio::test]
    async fn step_runs_calls_and_reflects() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls(vec![
                call("c1", "document_search", serde_json::json!({"query": "ownership"})),
                call("c2", "web_search", serde_json::json!({"query": "ownership"})),
            ]),
            text("end"),
        ]));
        let bus = Arc::new(EventBus::new(16));
        let mut events = bus.subscribe();
        let mut state = state();

        dispatcher(provider.clone(), bus, 3)
            .step(&mut state, &EventSink::disabled())
            .await
            .unwrap();

        assert_eq!(state.route, Route::End);
        assert_eq!(state.tool_iteration_count, 1);
        // human, assistant tool calls, two results
        assert_eq!(state.messages.len(), 4);
        assert_eq!(state.messages[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(state.messages[2].content, "chunk about ownership");
        assert_eq!(state.messages[3].tool_call_id.as_deref(), Some("c2"));
        assert!(state.unanswered_tool_calls().is_empty());

        let requests = provider.requests();
        assert_eq!(requests[0].tool_choice, ToolChoice::Required);
        assert_eq!(requests[0].tools.len(), 2);
        assert!(requests[1].tools.is_empty());
        assert!(requests[1].messages[1].content.contains("[document_search]\nchunk about ownership"));

        assert!(matches!(events.recv().await.unwrap().as_ref(), DomainEvent::ToolExecuted { .. }));
        assert!(matches!(events.recv().await.unwrap().as_ref(), DomainEvent::ToolExecuted { .. }));
    }

    #[tokio::test]
    async fn reflect_tools_keeps_looping() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls(vec![call("c1", "web_search", serde_json::json!({"query": "x"}))]),
            text(" Tools\n"),
        ]));
        let mut state = state();
        dispatcher(provider, Arc::new(EventBus::default()), 3)
            .step(&mut state, &EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(state.route, Route::Tools);
    }

    #[tokio::test]
    async fn cap_stops_without_calling_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut state = state();
        state.tool_iteration_count = 3;

        dispatcher(provider.clone(), Arc::new(EventBus::default()), 3)
            .step(&mut state, &EventSink::disabled())
            .await
            .unwrap();

        assert_eq!(state.route, Route::End);
        assert_eq!(state.tool_iteration_count, 4);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn no_tool_call_is_a_contract_violation() {
        let provider = Arc::new(ScriptedProvider::replies(["I'd rather just answer"]));
        let mut state = state();
        let result = dispatcher(provider, Arc::new(EventBus::default()), 3)
            .step(&mut state, &EventSink::disabled())
            .await;
        assert!(matches!(result, Err(TurnError::ContractViolation(_))));
        assert_eq!(state.messages.len(), 1);
    }

    #[tokio::test]
    async fn reflect_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_calls(vec![call(
            "c1",
            "web_search",
            serde_json::json!({"query": "x"}),
        )])]));
        let mut state = state();
        let result = dispatcher(provider, Arc::new(EventBus::default()), 3)
            .step(&mut state, &EventSink::disabled())
            .await;
        assert!(matches!(result, Err(TurnError::Provider(_))));
    }

    #[tokio::test]
    async fn unknown_tool_and_missing_ids_still_pair() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls(vec![
                call("", "web_search", serde_json::json!({"query": "x"})),
                call("", "no_such_tool", serde_json::json!({})),
            ]),
            text("end"),
        ]));
        let mut state = state();
        dispatcher(provider, Arc::new(EventBus::default()), 3)
            .step(&mut state, &EventSink::disabled())
            .await
            .unwrap();

        let ids: Vec<&str> = state.messages[1].tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.iter().all(|id| !id.is_empty()));
        assert_ne!(ids[0], ids[1]);
        assert_eq!(state.messages[2].tool_call_id.as_deref(), Some(ids[0]));
        assert_eq!(state.messages[3].tool_call_id.as_deref(), Some(ids[1]));
        assert_eq!(state.messages[3].content, "Error: unknown tool 'no_such_tool'");
    }

    #[tokio::test]
    async fn status_labels_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls(vec![call("c1", "web_search", serde_json::json!({"query": "x"}))]),
            text("end"),
        ]));
        let (tx, mut rx) = mpsc::channel(8);
        let mut state = state();
        dispatcher(provider, Arc::new(EventBus::default()), 3)
            .step(&mut state, &EventSink::new(tx))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), TurnEvent::Status("Searching".into()));
        assert_eq!(rx.recv().await.unwrap(), TurnEvent::Status("Using web_search".into()));
    }

    #[test]
    fn duplicate_ids_are_replaced() {
        let calls = assign_call_ids(
            &state(),
            vec![
                call("same", "a", serde_json::json!({})),
                call("same", "b", serde_json::json!({})),
            ],
        );
        assert_eq!(calls[0].id, "same");
        assert_ne!(calls[1].id, "same");
    }

    #[tokio::test]
    async fn reused_id_across_steps_keeps_results_attributed() {
        // Index-based ids: the backend says call_0 on every step
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_calls(vec![call("call_0", "document_search", serde_json::json!({"query": "q"}))]),
            text("tools"),
            tool_calls(vec![call("call_0", "web_search", serde_json::json!({"query": "q"}))]),
            text("end"),
        ]));
        let dispatcher = dispatcher(provider.clone(), Arc::new(EventBus::new(16)), 3);
        let mut state = state();

        dispatcher.step(&mut state, &EventSink::disabled()).await.unwrap();
        assert_eq!(state.route, Route::Tools);
        dispatcher.step(&mut state, &EventSink::disabled()).await.unwrap();
        assert_eq!(state.route, Route::End);

        let ids: Vec<&str> = state
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], "call_0");
        assert_ne!(ids[1], "call_0");

        let second_result = state.messages.last().unwrap();
        assert_eq!(second_result.tool_call_id.as_deref(), Some(ids[1]));
        assert_eq!(state.tool_name_for(ids[1]), Some("web_search"));

        let requests = provider.requests();
        let reflect = &requests[3].messages[1].content;
        assert!(reflect.contains("[document_search]\nchunk about ownership"));
        assert!(reflect.contains("[web_search]\n[1] Source: Rust Blog"));
    }
}
