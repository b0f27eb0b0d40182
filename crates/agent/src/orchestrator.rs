//! The turn driver.
//!
//! A turn walks `Start -> Routed -> ToolLoop* -> Responded -> Pruned -> End`
//! (see [`next_phase`]). Blocking callers use [`Orchestrator::run_turn`] or
//! [`Orchestrator::ask`]; streaming callers get a channel of [`TurnEvent`]s
//! from [`Orchestrator::run_turn_stream`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docchat_config::AppConfig;
use docchat_core::event::{DomainEvent, EventBus};
use docchat_core::provider::Provider;
use docchat_core::session::SessionStore;
use docchat_core::tool::ToolRegistry;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dispatch::ToolDispatcher;
use crate::error::TurnError;
use crate::generation::GenerationClient;
use crate::pruner::Pruner;
use crate::responder::{GeneratedAnswer, Responder};
use crate::router::QueryRouter;
use crate::state::{ConversationState, Route, TurnPhase, next_phase};
use crate::stream_event::{EventSink, TurnEvent};

pub const EMPTY_QUERY_MESSAGE: &str = "The query cannot be empty.";
pub const MISSING_SESSION_MESSAGE: &str = "A session id is required.";
pub const FORBIDDEN_MESSAGE: &str =
    "This session belongs to another user. Please log in with the correct account.";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred during processing.";
pub const FALLBACK_ANSWER: &str = "I'm sorry, I couldn't generate a response.";

/// One user question for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    pub session_id: String,

    /// Caller identity from the auth layer; `None` for guests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl TurnRequest {
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        identity: Option<String>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            identity,
        }
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// The generated answer; may be empty
    pub answer: String,
    pub session_id: String,
    /// Whether the router sent the turn through the tool loop
    pub used_tools: bool,
    /// Dispatch entries this turn; one past the cap when the cap ended the loop
    pub tool_iterations: u32,
    /// The summary as persisted at the end of the turn
    pub summary: String,
}

/// The blocking entry point's response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: String,
    pub code: u16,
}

impl TurnOutcome {
    pub fn success(answer: String, session_id: String) -> Self {
        let answer = if answer.trim().is_empty() {
            FALLBACK_ANSWER.to_string()
        } else {
            answer
        };
        Self {
            answer,
            session_id: Some(session_id),
            status: "success".into(),
            code: 200,
        }
    }

    pub fn failure(error: &TurnError, session_id: String) -> Self {
        let answer = match error {
            TurnError::Validation(message) => message.clone(),
            TurnError::Forbidden { .. } => FORBIDDEN_MESSAGE.to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        };
        Self {
            answer,
            session_id: (!session_id.is_empty()).then_some(session_id),
            status: "error".into(),
            code: error.status_code(),
        }
    }
}

/// Drives turns against a session store, a tool registry and three
/// generation clients.
pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    router: QueryRouter,
    dispatcher: ToolDispatcher,
    responder: Responder,
    pruner: Pruner,
    event_bus: Arc<EventBus>,
    heartbeat_interval: Duration,
    event_buffer: usize,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionStore>,
        event_bus: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        let orchestration = &config.orchestration;
        let (chat, tool, summary) = GenerationClient::from_models(provider, &config.models);

        Self {
            sessions,
            router: QueryRouter::new(chat.clone(), orchestration.router_window),
            dispatcher: ToolDispatcher::new(tool, tools, event_bus.clone(), orchestration.max_tool_iterations),
            responder: Responder::new(chat, orchestration.response_window),
            pruner: Pruner::new(summary, orchestration.summary_word_limit),
            event_bus,
            heartbeat_interval: Duration::from_secs(orchestration.heartbeat_interval_secs.max(1)),
            event_buffer: orchestration.event_buffer.max(1),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run a turn to completion.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnReply, TurnError> {
        let state = self.open_session(&request).await?;
        self.execute(state, &EventSink::disabled()).await
    }

    /// Run a turn and fold the result into a status-coded outcome.
    pub async fn ask(&self, request: TurnRequest) -> TurnOutcome {
        let session_id = request.session_id.clone();
        match self.run_turn(request).await {
            Ok(reply) => TurnOutcome::success(reply.answer, session_id),
            Err(e) => {
                if e.status_code() >= 500 {
                    error!(session_id = %session_id, error = %e, "Turn failed");
                } else {
                    warn!(session_id = %session_id, error = %e, "Turn rejected");
                }
                TurnOutcome::failure(&e, session_id)
            }
        }
    }

    /// Start a streaming turn. Validation and ownership errors are returned
    /// here, before any event is produced. The stream ends with exactly one
    /// `done` or `error` event; dropping the receiver cancels the turn.
    pub async fn run_turn_stream(
        self: &Arc<Self>,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<TurnEvent>, TurnError> {
        let state = self.open_session(&request).await?;
        let (tx, rx) = mpsc::channel(self.event_buffer);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.stream_turn(state, tx).await });

        Ok(rx)
    }

    async fn stream_turn(&self, state: ConversationState, tx: mpsc::Sender<TurnEvent>) {
        let session_id = state.session_id.clone();
        let heartbeat = HeartbeatTask::spawn(tx.clone(), self.heartbeat_interval);
        let sink = EventSink::new(tx.clone());

        let result = tokio::select! {
            result = self.execute(state, &sink) => Some(result),
            _ = tx.closed() => None,
        };

        heartbeat.stop().await;

        match result {
            Some(Ok(_)) => {
                let _ = tx.send(TurnEvent::Done).await;
            }
            Some(Err(TurnError::Cancelled)) | None => {
                info!(session_id = %session_id, "Stream consumer disconnected, turn cancelled");
            }
            Some(Err(_)) => {
                let _ = tx.send(TurnEvent::Error(INTERNAL_ERROR_MESSAGE.into())).await;
            }
        }
    }

    /// Validate the request, create the session if needed and check
    /// ownership. Nothing else is touched when this fails.
    async fn open_session(&self, request: &TurnRequest) -> Result<ConversationState, TurnError> {
        if request.query.trim().is_empty() {
            return Err(TurnError::Validation(EMPTY_QUERY_MESSAGE.into()));
        }
        if request.session_id.trim().is_empty() {
            return Err(TurnError::Validation(MISSING_SESSION_MESSAGE.into()));
        }

        let identity = request.identity.as_deref().filter(|id| !id.is_empty());
        let session = self.sessions.upsert_session(&request.session_id, identity).await?;

        if !session.accessible_by(identity) {
            return Err(TurnError::Forbidden {
                session_id: request.session_id.clone(),
            });
        }

        Ok(ConversationState::begin(&session, &request.query))
    }

    async fn execute(
        &self,
        mut state: ConversationState,
        sink: &EventSink,
    ) -> Result<TurnReply, TurnError> {
        info!(
            session_id = %state.session_id,
            retained = state.messages.len() - 1,
            streaming = sink.is_streaming(),
            "Starting turn"
        );
        self.event_bus.publish(DomainEvent::TurnStarted {
            session_id: state.session_id.clone(),
            timestamp: Utc::now(),
        });

        let result = self.drive(&mut state, sink).await;

        match result {
            Ok(answer) => {
                self.event_bus.publish(DomainEvent::TurnCompleted {
                    session_id: state.session_id.clone(),
                    tool_iterations: state.tool_iteration_count,
                    timestamp: Utc::now(),
                });
                Ok(TurnReply {
                    answer: answer.map(|a| a.content).unwrap_or_default(),
                    used_tools: state.tool_iteration_count > 0,
                    tool_iterations: state.tool_iteration_count,
                    summary: state.summary,
                    session_id: state.session_id,
                })
            }
            Err(e) => {
                if !matches!(e, TurnError::Cancelled) {
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: format!("turn {}", state.session_id),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Walk the phase table until `End`.
    async fn drive(
        &self,
        state: &mut ConversationState,
        sink: &EventSink,
    ) -> Result<Option<GeneratedAnswer>, TurnError> {
        sink.status("Thinking").await?;

        let mut phase = TurnPhase::Start;
        let mut answer = None;

        loop {
            phase = next_phase(phase, state.route);
            debug!(session_id = %state.session_id, phase = ?phase, route = %state.route, "Entering phase");

            match phase {
                TurnPhase::Start => {}
                TurnPhase::Routed => {
                    state.route = self.router.route(&state.messages).await;
                    self.event_bus.publish(DomainEvent::RouteDecided {
                        session_id: state.session_id.clone(),
                        route: state.route.to_string(),
                        timestamp: Utc::now(),
                    });
                }
                TurnPhase::ToolLoop => {
                    self.dispatcher.step(state, sink).await?;
                }
                TurnPhase::Responded => {
                    sink.status("Writing").await?;
                    let generated = self.responder.respond(state, sink).await?;
                    self.event_bus.publish(DomainEvent::ResponseGenerated {
                        session_id: state.session_id.clone(),
                        model: generated.model.clone(),
                        tokens_used: generated.tokens_used,
                        timestamp: Utc::now(),
                    });
                    state.route = Route::End;
                    answer = Some(generated);
                }
                TurnPhase::Pruned => {
                    self.pruner.finalize(state).await;
                    self.persist(state).await;
                }
                TurnPhase::End => break,
            }
        }

        Ok(answer)
    }

    async fn persist(&self, state: &ConversationState) {
        match self
            .sessions
            .save_turn(&state.session_id, &state.summary, &state.messages)
            .await
        {
            Ok(()) => debug!(session_id = %state.session_id, "Session state saved"),
            Err(e) => warn!(session_id = %state.session_id, error = %e, "Failed to save session state"),
        }
    }
}

/// Periodic `heartbeat` events for a streaming turn. Aborted on drop, so
/// every exit path of the turn task stops it.
struct HeartbeatTask {
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatTask {
    fn spawn(tx: mpsc::Sender<TurnEvent>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(TurnEvent::Heartbeat).await.is_err() {
                    break;
                }
            }
        });
        Self { handle: Some(handle) }
    }

    /// Abort and wait, so no heartbeat can follow the terminal event.
    async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
