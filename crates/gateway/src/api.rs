//! HTTP API — chat turns, history, sessions, documents and events.
//!
//! Endpoints:
//!
//! - `POST /chats/ask`                  — Run a turn, get `{answer, session_id, status, code}`
//! - `POST /chats/ask/stream`           — Run a turn, get an SSE stream of turn events
//! - `GET  /chats/history/{session_id}` — Summary, retained dialogue and ingested sources
//! - `GET  /sessions`                   — Sessions owned by the caller
//! - `POST /auth/claim_sessions`        — Attach guest sessions to the caller
//! - `POST /documents`                  — Chunk and store text for a session
//! - `GET  /events`                     — SSE stream of domain events

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{error, info, warn};

use docchat_agent::{TurnOutcome, TurnRequest};
use docchat_core::error::StoreError;
use docchat_core::event::DomainEvent;
use docchat_core::message::Role;

use crate::SharedState;

/// Header carrying the authenticated caller, set by the fronting auth layer.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Build the API router.
pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chats/ask", post(ask_handler))
        .route("/chats/ask/stream", post(ask_stream_handler))
        .route("/chats/history/{session_id}", get(history_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/auth/claim_sessions", post(claim_sessions_handler))
        .route("/documents", post(ingest_document_handler))
        .route("/events", get(event_stream_handler))
        .with_state(state)
}

/// The caller's identity, `None` for guests.
fn identity(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn status_of(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: String,
}

impl AskRequest {
    fn into_turn(self, identity: Option<String>) -> TurnRequest {
        TurnRequest::new(self.query, self.session_id, identity)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

fn store_failure(context: &str, e: StoreError) -> ApiError {
    error!(error = %e, "{context} failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{context} failed."))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub summary: String,
    pub history: Vec<HistoryEntry>,
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimSessionsRequest {
    #[serde(default)]
    pub session_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimSessionsResponse {
    pub status: String,
    pub claimed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub session_id: String,
    pub source: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub session_id: String,
    pub source: String,
    pub chunks: usize,
}

// ── Turns ─────────────────────────────────────────────────────────────────

/// `POST /chats/ask` — blocking turn. The HTTP status mirrors `code`.
async fn ask_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<AskRequest>,
) -> (StatusCode, Json<TurnOutcome>) {
    info!(session_id = %payload.session_id, "chats/ask request");

    let outcome = state
        .services
        .orchestrator
        .ask(payload.into_turn(identity(&headers)))
        .await;
    (status_of(outcome.code), Json(outcome))
}

/// `POST /chats/ask/stream` — streaming turn. Each turn event becomes one
/// `data:` frame; validation and ownership failures are answered with a
/// plain JSON error before the stream opens. Closing the connection
/// cancels the turn.
async fn ask_stream_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<TurnOutcome>)> {
    info!(session_id = %payload.session_id, "chats/ask/stream SSE request");

    let session_id = payload.session_id.clone();
    let rx = state
        .services
        .orchestrator
        .run_turn_stream(payload.into_turn(identity(&headers)))
        .await
        .map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Streaming turn rejected");
            let outcome = TurnOutcome::failure(&e, session_id.clone());
            (status_of(outcome.code), Json(outcome))
        })?;

    let stream = ReceiverStream::new(rx)
        .map(|event| Ok::<_, Infallible>(SseEvent::default().data(event.to_json())));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    ))
}

// ── Sessions ──────────────────────────────────────────────────────────────

/// `GET /chats/history/{session_id}` — what the session currently retains.
/// Unknown sessions read as empty.
async fn history_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let caller = identity(&headers);
    let session = state
        .services
        .sessions
        .get_session(&session_id)
        .await
        .map_err(|e| store_failure("Loading history", e))?;

    let Some(session) = session else {
        return Ok(Json(HistoryResponse {
            session_id,
            summary: String::new(),
            history: Vec::new(),
            sources: Vec::new(),
        }));
    };

    if !session.accessible_by(caller.as_deref()) {
        warn!(session_id = %session_id, "History request for a session owned by someone else");
        return Err(api_error(StatusCode::FORBIDDEN, docchat_agent::orchestrator::FORBIDDEN_MESSAGE));
    }

    let sources = state
        .services
        .documents
        .sources(&session_id)
        .await
        .map_err(|e| store_failure("Loading sources", e))?;

    let history = session
        .retained_messages
        .iter()
        .filter(|m| m.role == Role::Human || m.is_assistant_text())
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| HistoryEntry {
            role: if m.role == Role::Human { "user" } else { "assistant" }.to_string(),
            content: m.content.trim().to_string(),
        })
        .collect();

    Ok(Json(HistoryResponse {
        session_id,
        summary: session.summary,
        history,
        sources,
    }))
}

/// `GET /sessions` — the caller's sessions, newest first. Guests get an
/// empty list.
async fn list_sessions_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    let Some(owner) = identity(&headers) else {
        return Ok(Json(Vec::new()));
    };

    let sessions = state
        .services
        .sessions
        .list_sessions(&owner)
        .await
        .map_err(|e| store_failure("Listing sessions", e))?;

    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionInfo {
                session_id: s.session_id,
                summary: s.summary,
                created_at: s.created_at,
                updated_at: s.updated_at,
            })
            .collect(),
    ))
}

/// `POST /auth/claim_sessions` — attach ownerless sessions to the caller.
async fn claim_sessions_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<ClaimSessionsRequest>,
) -> Result<Json<ClaimSessionsResponse>, ApiError> {
    let Some(owner) = identity(&headers) else {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "Authentication required to claim sessions.",
        ));
    };

    if payload.session_ids.is_empty() {
        return Ok(Json(ClaimSessionsResponse {
            status: "success".into(),
            claimed_count: 0,
            message: None,
        }));
    }

    let claimed = state
        .services
        .sessions
        .claim_sessions(&owner, &payload.session_ids)
        .await
        .map_err(|e| store_failure("Claiming sessions", e))?;

    info!(requested = payload.session_ids.len(), claimed, "Guest sessions claimed");

    Ok(Json(ClaimSessionsResponse {
        status: "success".into(),
        claimed_count: claimed,
        message: Some(format!("Successfully linked {claimed} guest sessions to your account.")),
    }))
}

// ── Documents ─────────────────────────────────────────────────────────────

/// `POST /documents` — chunk text into the session's document store. The
/// session is created for the caller if it does not exist yet.
async fn ingest_document_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    if payload.session_id.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, docchat_agent::orchestrator::MISSING_SESSION_MESSAGE));
    }
    if payload.source.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "A document source name is required."));
    }

    let caller = identity(&headers);
    let session = state
        .services
        .sessions
        .upsert_session(&payload.session_id, caller.as_deref())
        .await
        .map_err(|e| store_failure("Opening session", e))?;
    if !session.accessible_by(caller.as_deref()) {
        return Err(api_error(StatusCode::FORBIDDEN, docchat_agent::orchestrator::FORBIDDEN_MESSAGE));
    }

    let chunks = state
        .services
        .ingestor
        .ingest(&payload.session_id, &payload.source, &payload.text)
        .await
        .map_err(|e| store_failure("Ingesting document", e))?;

    info!(session_id = %payload.session_id, source = %payload.source, chunks, "Document ingested");

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            session_id: payload.session_id,
            source: payload.source,
            chunks,
        }),
    ))
}

// ── Domain event stream ───────────────────────────────────────────────────

fn event_name(event: &DomainEvent) -> &'static str {
    match event {
        DomainEvent::TurnStarted { .. } => "turn_started",
        DomainEvent::RouteDecided { .. } => "route_decided",
        DomainEvent::ToolExecuted { .. } => "tool_executed",
        DomainEvent::ResponseGenerated { .. } => "response_generated",
        DomainEvent::TurnCompleted { .. } => "turn_completed",
        DomainEvent::ErrorOccurred { .. } => "error_occurred",
    }
}

/// `GET /events` — SSE stream of domain events. Lagging subscribers skip
/// what they missed.
async fn event_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.services.event_bus.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event_name(&event)).data(data))
        });

    Sse::new(stream)
}
