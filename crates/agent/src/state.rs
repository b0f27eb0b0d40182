//! Per-turn conversation state and the phase transition table.

use std::fmt;

use docchat_core::message::{Message, Role};
use docchat_core::session::Session;

/// Where the turn goes next, as decided by the router and the tool loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    #[default]
    Unset,
    Chat,
    Tools,
    End,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unset => "unset",
            Self::Chat => "chat",
            Self::Tools => "tools",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

/// Driver phases. A turn always walks
/// `Start -> Routed -> ToolLoop* -> Responded -> Pruned -> End`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    Routed,
    ToolLoop,
    Responded,
    Pruned,
    End,
}

/// The transition function. Pure; the driver performs each phase's work
/// after entering it.
pub fn next_phase(phase: TurnPhase, route: Route) -> TurnPhase {
    match (phase, route) {
        (TurnPhase::Start, _) => TurnPhase::Routed,
        (TurnPhase::Routed, Route::Tools) => TurnPhase::ToolLoop,
        (TurnPhase::Routed, _) => TurnPhase::Responded,
        (TurnPhase::ToolLoop, Route::Tools) => TurnPhase::ToolLoop,
        (TurnPhase::ToolLoop, _) => TurnPhase::Responded,
        (TurnPhase::Responded, _) => TurnPhase::Pruned,
        (TurnPhase::Pruned, _) | (TurnPhase::End, _) => TurnPhase::End,
    }
}

/// Everything a turn reads and writes. Owned by the task running the turn.
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub session_id: String,

    /// Append-only during a turn; pruning replaces the whole list.
    /// Never contains system messages.
    pub messages: Vec<Message>,

    pub route: Route,

    /// Tool-dispatch steps taken this turn
    pub tool_iteration_count: u32,

    /// Running summary, rewritten at most once per turn
    pub summary: String,
}

impl ConversationState {
    /// State for a new turn: the session's retained messages followed by the
    /// new question.
    pub fn begin(session: &Session, query: &str) -> Self {
        let mut messages: Vec<Message> = session
            .retained_messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();
        messages.push(Message::human(query));

        Self {
            session_id: session.session_id.clone(),
            messages,
            route: Route::Unset,
            tool_iteration_count: 0,
            summary: session.summary.clone(),
        }
    }

    pub fn last_human_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::Human)
    }

    pub fn last_human(&self) -> Option<&Message> {
        self.last_human_index().map(|i| &self.messages[i])
    }

    /// Messages from the latest human message onward.
    pub fn since_last_human(&self) -> &[Message] {
        match self.last_human_index() {
            Some(i) => &self.messages[i..],
            None => &[],
        }
    }

    /// The latest non-empty assistant text message.
    pub fn last_answer(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_assistant_text() && !m.content.trim().is_empty())
    }

    /// The last `n` messages.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Name of the tool an assistant message asked for under `call_id`.
    pub fn tool_name_for(&self, call_id: &str) -> Option<&str> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .find(|c| c.id == call_id)
            .map(|c| c.name.as_str())
    }

    /// Ids of assistant tool calls that have no tool-result message after them.
    pub fn unanswered_tool_calls(&self) -> Vec<String> {
        let mut pending: Vec<String> = Vec::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => pending.extend(message.tool_calls.iter().map(|c| c.id.clone())),
                Role::Tool => {
                    if let Some(id) = &message.tool_call_id {
                        pending.retain(|p| p != id);
                    }
                }
                _ => {}
            }
        }
        pending
    }
}
