//! Canonical data model for the strand agent runtime.
//!
//! This crate defines the provider-agnostic types that flow between the
//! provider layer, the agent loop, and the session store:
//!
//! - [`message`] -- conversation messages, content blocks, and tool calls.
//! - [`event`] -- the canonical streaming event set every provider emits.
//! - [`model`] -- model descriptors, APIs, thinking levels, stop reasons.
//! - [`usage`] -- token accounting and cost computation.
//! - [`error`] -- provider error kinds and their retry classification.
//!
//! Everything here is plain data: no I/O, no async, no provider specifics.
//! The [`crate::provider` layer](https://docs.rs/strand-provider) translates
//! these types into provider wire formats and back.

pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod usage;

pub use error::{AssistantError, ErrorKind, ProviderError};
pub use event::AssistantMessageEvent;
pub use message::{
    AgentMessage, ContentBlock, ContentPart, CustomRecord, Message, ToolCallBlock, UserContent,
};
pub use model::{
    Api, LlmModel, Modality, ModelCost, StopReason, ThinkingBudgets, ThinkingLevel, ToolDefinition,
};
pub use usage::Usage;
