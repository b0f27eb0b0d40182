//! # docchat Core
//!
//! Domain types, traits, and error definitions for the docchat retrieval
//! assistant. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (language model, tool adapter, session store,
//! document store) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/in-memory implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod document;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use document::{DocumentChunk, DocumentStore, RetrievedChunk};
pub use error::{ProviderError, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolChoice, ToolDefinition, Usage,
};
pub use session::{Session, SessionStore};
pub use tool::{Tool, ToolCall, ToolContext, ToolInvocation, ToolRegistry, ToolResult};
