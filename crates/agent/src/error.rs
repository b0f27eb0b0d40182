//! Turn-level errors.

use docchat_core::error::{ProviderError, StoreError};
use thiserror::Error;

/// Why a turn was aborted.
#[derive(Debug, Error)]
pub enum TurnError {
    /// The request itself is malformed; nothing was touched.
    #[error("{0}")]
    Validation(String),

    #[error("Session {session_id} belongs to another user")]
    Forbidden { session_id: String },

    /// The model broke a protocol rule (e.g. no tool call under `required`).
    #[error("Model contract violated: {0}")]
    ContractViolation(String),

    /// An assistant tool call had no tool result before the next generation call.
    #[error("Tool call {0} has no result")]
    UnansweredToolCall(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stream consumer went away.
    #[error("Turn cancelled")]
    Cancelled,
}

impl TurnError {
    /// HTTP-style status code reported to callers of the blocking entry point.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Forbidden { .. } => 403,
            _ => 500,
        }
    }
}
