//! Shared types for the hub workspace: configuration, the provider-agnostic
//! message model, typed errors, and structured trace events.

pub mod config;
pub mod error;
pub mod tool;
pub mod trace;

pub use config::Config;
pub use error::{Error, Result};
pub use tool::{
    ContentPart, Message, MessageContent, ProviderResponse, Role, StopReason, ToolDefinition,
    ToolDispatcher,
};
pub use trace::TraceEvent;
