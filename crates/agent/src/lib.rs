//! Query orchestration — the heart of docchat.
//!
//! Each turn follows a fixed phase walk:
//!
//! 1. **Route** the question: direct chat, or tools first
//! 2. **Tool loop** (bounded): the tool model picks tools, they run
//!    concurrently, results join the conversation, a reflect call decides
//!    whether to go again
//! 3. **Respond** with the chat model, blocking or streamed token by token
//! 4. **Prune**: fold the exchange into the running summary, keep only the
//!    latest question and answer, persist
//!
//! The tool loop is capped, so every turn terminates.

pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod prompts;
pub mod pruner;
pub mod responder;
pub mod router;
pub mod state;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use bootstrap::{Services, build_services};
pub use dispatch::ToolDispatcher;
pub use error::TurnError;
pub use generation::GenerationClient;
pub use orchestrator::{Orchestrator, TurnOutcome, TurnReply, TurnRequest};
pub use pruner::{Pruner, prune_messages};
pub use responder::{GeneratedAnswer, Responder};
pub use router::QueryRouter;
pub use state::{ConversationState, Route, TurnPhase, next_phase};
pub use stream_event::{EventSink, TurnEvent};
