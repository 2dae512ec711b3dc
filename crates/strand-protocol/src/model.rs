//! Model descriptors and related enums.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Wire APIs
// ---------------------------------------------------------------------------

/// The wire API a model is reached through. The provider registry maps each
/// variant to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Api {
    /// Anthropic Messages API.
    #[serde(rename = "anthropic-messages")]
    AnthropicMessages,
    /// OpenAI Chat Completions API (and compatible gateways).
    #[serde(rename = "openai-chat")]
    OpenAiChat,
    /// OpenAI Responses API.
    #[serde(rename = "openai-responses")]
    OpenAiResponses,
}

impl Api {
    /// Stable identifier used in logs and session files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnthropicMessages => "anthropic-messages",
            Self::OpenAiChat => "openai-chat",
            Self::OpenAiResponses => "openai-responses",
        }
    }
}

impl std::fmt::Display for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stop reasons
// ---------------------------------------------------------------------------

/// Why an assistant message stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Natural end of turn.
    Stop,
    /// Output token limit reached.
    Length,
    /// The model requested tool execution.
    ToolUse,
    /// The stream terminated with an error.
    Error,
    /// The stream was cancelled by the caller.
    Aborted,
}

// ---------------------------------------------------------------------------
// Thinking levels
// ---------------------------------------------------------------------------

/// Reasoning intensity. Ordering is meaningful: budgets and effort mappings
/// are looked up per level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ThinkingLevel {
    /// Reasoning disabled.
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    XHigh,
}

impl ThinkingLevel {
    /// The default reasoning token budget for this level, or `None` when
    /// reasoning is off.
    pub fn default_budget(&self) -> Option<u32> {
        match self {
            Self::Off => None,
            Self::Minimal => Some(1024),
            Self::Low => Some(2048),
            Self::Medium => Some(4096),
            Self::High => Some(8192),
            Self::XHigh => Some(32_768),
        }
    }
}

/// Optional per-level overrides of the default budget table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingBudgets {
    pub minimal: Option<u32>,
    pub low: Option<u32>,
    pub medium: Option<u32>,
    pub high: Option<u32>,
    pub x_high: Option<u32>,
}

impl ThinkingBudgets {
    /// Resolve the budget for `level`, preferring an override.
    pub fn resolve(&self, level: ThinkingLevel) -> Option<u32> {
        let override_ = match level {
            ThinkingLevel::Off => None,
            ThinkingLevel::Minimal => self.minimal,
            ThinkingLevel::Low => self.low,
            ThinkingLevel::Medium => self.medium,
            ThinkingLevel::High => self.high,
            ThinkingLevel::XHigh => self.x_high,
        };
        override_.or_else(|| level.default_budget())
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Input modality a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Modality {
    Text,
    Image,
}

/// Per-million-token pricing, split four ways.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

/// A configured model. Stable identity is [`LlmModel::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmModel {
    /// Model identifier sent on the wire (e.g. `"claude-sonnet-4-20250514"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Wire API used to reach the model.
    pub api: Api,
    /// Provider name, used for key lookup (e.g. `"anthropic"`).
    pub provider: String,
    /// Override of the provider's default base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Whether the model supports reasoning.
    pub reasoning: bool,
    /// Accepted input modalities.
    #[serde(default)]
    pub modalities: Vec<Modality>,
    /// Per-million-token pricing.
    #[serde(default)]
    pub cost: ModelCost,
    /// Context window size in tokens.
    pub context_window: u64,
    /// Maximum output tokens per response.
    pub max_tokens: u32,
    /// Extra HTTP headers to send with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

/// A tool definition exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
