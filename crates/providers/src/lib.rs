//! LLM Provider implementations for docchat.
//!
//! All providers implement the `docchat_core::Provider` trait.
//! The registry builds the configured providers once at startup.

pub mod openai_compat;
pub mod registry;

pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderRegistry, build_from_config};
