//! Turn-level streaming events.
//!
//! `TurnEvent` is what a streaming turn sends to its consumer. The gateway
//! forwards each one as an SSE `data:` frame; the wire shape is always
//! `{"type": ..., "data": ...}`:
//! - `status`    — progress label ("Thinking", "Searching", "Using web_search", "Writing")
//! - `token`     — answer fragment, in generation order
//! - `done`      — the turn finished; nothing follows
//! - `error`     — the turn failed; replaces `done`
//! - `heartbeat` — keep-alive while nothing else is flowing

use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::mpsc;

use crate::error::TurnError;

/// Events emitted by a streaming turn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawEvent")]
pub enum TurnEvent {
    Status(String),
    Token(String),
    Done,
    Error(String),
    Heartbeat,
}

impl TurnEvent {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Token(_) => "token",
            Self::Done => "done",
            Self::Error(_) => "error",
            Self::Heartbeat => "heartbeat",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Status(s) | Self::Token(s) | Self::Error(s) => s,
            Self::Done | Self::Heartbeat => "",
        }
    }

    /// True for `done` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    /// Compact JSON for one SSE frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: String,
}

impl Serialize for TurnEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawEvent {
            kind: self.event_type().to_string(),
            data: self.data().to_string(),
        }
        .serialize(serializer)
    }
}

impl TryFrom<RawEvent> for TurnEvent {
    type Error = String;

    fn try_from(raw: RawEvent) -> Result<Self, String> {
        match raw.kind.as_str() {
            "status" => Ok(TurnEvent::Status(raw.data)),
            "token" => Ok(TurnEvent::Token(raw.data)),
            "done" => Ok(TurnEvent::Done),
            "error" => Ok(TurnEvent::Error(raw.data)),
            "heartbeat" => Ok(TurnEvent::Heartbeat),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// Where a turn sends progress. Disabled for blocking turns.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<TurnEvent>>,
}

impl EventSink {
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: mpsc::Sender<TurnEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    /// Send an event. Fails with `Cancelled` once the consumer is gone.
    pub async fn emit(&self, event: TurnEvent) -> Result<(), TurnError> {
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| TurnError::Cancelled),
            None => Ok(()),
        }
    }

    pub async fn status(&self, label: impl Into<String>) -> Result<(), TurnError> {
        self.emit(TurnEvent::Status(label.into())).await
    }

    pub async fn token(&self, fragment: impl Into<String>) -> Result<(), TurnError> {
        self.emit(TurnEvent::Token(fragment.into())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape() {
        assert_eq!(TurnEvent::Status("Thinking".into()).to_json(), r#"{"type":"status","data":"Thinking"}"#);
        assert_eq!(TurnEvent::Token("Hel".into()).to_json(), r#"{"type":"token","data":"Hel"}"#);
        assert_eq!(TurnEvent::Done.to_json(), r#"{"type":"done","data":""}"#);
        assert_eq!(TurnEvent::Heartbeat.to_json(), r#"{"type":"heartbeat","data":""}"#);
        assert_eq!(TurnEvent::Error("boom".into()).to_json(), r#"{"type":"error","data":"boom"}"#);
    }

    #[test]
    fn event_deserialization() {
        let event: TurnEvent = serde_json::from_str(r#"{"type":"token","data":"hi"}"#).unwrap();
        assert_eq!(event, TurnEvent::Token("hi".into()));

        let done: TurnEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, TurnEvent::Done);

        assert!(serde_json::from_str::<TurnEvent>(r#"{"type":"chunk","data":""}"#).is_err());
    }

    #[test]
    fn terminal_events() {
        assert!(TurnEvent::Done.is_terminal());
        assert!(TurnEvent::Error("x".into()).is_terminal());
        assert!(!TurnEvent::Heartbeat.is_terminal());
    }

    #[tokio::test]
    async fn sink_reports_closed_consumer() {
        let (tx, rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        sink.status("Thinking").await.unwrap();
        drop(rx);
        assert!(matches!(sink.token("x").await, Err(TurnError::Cancelled)));

        let disabled = EventSink::disabled();
        assert!(!disabled.is_streaming());
        disabled.token("ignored").await.unwrap();
    }
}
