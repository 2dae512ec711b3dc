//! Conversation messages and content blocks.
//!
//! A [`Message`] is one of three variants: user input, an assistant
//! response, or a tool result. Assistant content is an *ordered* list of
//! [`ContentBlock`]s because providers interleave text, thinking, and tool
//! calls within a single response; the order is part of the contract.
//!
//! [`AgentMessage`] wraps either a [`Message`] or an opaque custom record.
//! Custom records are persisted and visible to host code but are filtered
//! out before anything is sent to a provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AssistantError;
use crate::model::{Api, StopReason};
use crate::usage::Usage;

// ---------------------------------------------------------------------------
// Content fragments
// ---------------------------------------------------------------------------

/// A text or image fragment, used for user message blocks and tool result
/// content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// A base64-encoded image.
    Image {
        /// IANA media type (e.g. `"image/png"`).
        media_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
}

impl ContentPart {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// The content of a user message: either a plain string or an ordered list
/// of text/image parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain text content.
    Text(String),
    /// Structured content parts.
    Parts(Vec<ContentPart>),
}

impl UserContent {
    /// Concatenated text of the content, ignoring images.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

impl From<&str> for UserContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for UserContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

// ---------------------------------------------------------------------------
// Assistant content blocks
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBlock {
    /// Provider-assigned identifier, unique within the message. Preserved
    /// unchanged between assistant emission and the matching tool result.
    pub id: String,

    /// Name of the tool to invoke.
    pub name: String,

    /// Parsed arguments. Built incrementally as a raw JSON string during
    /// streaming and parsed exactly once when the call block terminates; a
    /// parse failure yields an empty map.
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Opaque provider signature attached to the call (some APIs require it
    /// to be echoed back).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// A typed fragment of an assistant message. Order across block kinds is
/// preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentBlock {
    /// Visible output text.
    Text {
        /// The text payload.
        text: String,
    },
    /// Model reasoning, when the provider surfaces it.
    Thinking {
        /// The reasoning text.
        thinking: String,
        /// Provider signature over the reasoning, if supplied.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A tool invocation request.
    ToolCall(ToolCallBlock),
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single message in a conversation. Messages are immutable once their
/// terminal event has been observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// Input from the human user.
    User {
        /// Unique message id.
        id: String,
        /// Text or structured content.
        content: UserContent,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },

    /// Output from the model.
    Assistant {
        /// Unique message id (provider-assigned when available).
        id: String,
        /// Ordered content blocks.
        content: Vec<ContentBlock>,
        /// Which wire API produced this message.
        api: Api,
        /// Provider name (e.g. `"anthropic"`).
        provider: String,
        /// Model identifier.
        model: String,
        /// Token usage, when reported.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        /// Why the model stopped.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<StopReason>,
        /// Error details when the stream terminated abnormally.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<AssistantError>,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },

    /// Result of a tool invocation, fed back to the model.
    ToolResult {
        /// Unique message id.
        id: String,
        /// The [`ToolCallBlock::id`] this result answers.
        tool_call_id: String,
        /// Name of the tool that ran.
        tool_name: String,
        /// Text and/or image content.
        content: Vec<ContentPart>,
        /// Whether the invocation failed.
        #[serde(default)]
        is_error: bool,
        /// Creation time.
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    /// Create a user message with a fresh id.
    pub fn user(content: impl Into<UserContent>) -> Self {
        Self::User {
            id: Uuid::now_v7().to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a tool result message with a fresh id.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Vec<ContentPart>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            id: Uuid::now_v7().to_string(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content,
            is_error,
            timestamp: Utc::now(),
        }
    }

    /// The message id.
    pub fn id(&self) -> &str {
        match self {
            Self::User { id, .. } | Self::Assistant { id, .. } | Self::ToolResult { id, .. } => id,
        }
    }

    /// Concatenated text content of the message, ignoring images, thinking,
    /// and tool calls.
    pub fn text(&self) -> String {
        match self {
            Self::User { content, .. } => content.as_text(),
            Self::Assistant { content, .. } => content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
            Self::ToolResult { content, .. } => content
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Tool calls carried by this message (empty unless assistant).
    pub fn tool_calls(&self) -> Vec<&ToolCallBlock> {
        match self {
            Self::Assistant { content, .. } => content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolCall(call) => Some(call),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Error details for an assistant message, if any.
    pub fn error(&self) -> Option<&AssistantError> {
        match self {
            Self::Assistant { error, .. } => error.as_ref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent messages
// ---------------------------------------------------------------------------

/// An opaque host-defined record carried in the transcript but never sent
/// to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRecord {
    /// Host-defined discriminator.
    #[serde(rename = "type")]
    pub custom_type: String,
    /// Arbitrary payload.
    pub data: Value,
}

/// A transcript item: either a conversation [`Message`] or a custom record.
/// Only `Message` variants ever cross the LLM boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentMessage {
    /// A conversation message.
    Message(Message),
    /// A host-defined record, filtered out before provider calls.
    Custom(CustomRecord),
}

impl AgentMessage {
    /// The wrapped [`Message`], if this is not a custom record.
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            Self::Custom(_) => None,
        }
    }
}

impl From<Message> for AgentMessage {
    fn from(m: Message) -> Self {
        Self::Message(m)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
