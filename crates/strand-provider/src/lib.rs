//! Provider layer for the strand agent runtime.
//!
//! Stateless adapters that translate a neutral request/context into a
//! provider-specific HTTP POST, consume the Server-Sent Events byte stream,
//! and emit the canonical [`strand_protocol::AssistantMessageEvent`]
//! sequence terminated by exactly one `Done` or `Error` event.
//!
//! ## Modules
//!
//! - [`sse`] -- incremental SSE decoder.
//! - [`provider`] -- the [`Provider`] trait, request context, and the event
//!   stream type.
//! - [`anthropic`], [`openai_chat`], [`openai_responses`] -- the adapters.
//! - [`registry`] -- maps APIs to adapter instances.
//! - [`throttle`] -- delta-coalescing stream adapter for UI-bound event
//!   emission.

pub mod anthropic;
mod http;
pub mod openai_chat;
pub mod openai_responses;
pub mod provider;
pub mod registry;
mod sink;
pub mod sse;
pub mod throttle;

pub use anthropic::AnthropicProvider;
pub use openai_chat::OpenAiChatProvider;
pub use openai_responses::OpenAiResponsesProvider;
pub use provider::{AssistantEventStream, Context, Provider, StreamOptions};
pub use registry::ProviderRegistry;
pub use sse::{SseDecoder, SseEvent};
pub use throttle::{coalesce, ThrottleConfig};
