//! Agent error types.

use strand_protocol::ProviderError;
use strand_session::SessionError;

/// Unified error type for the agent crate.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A provider failure that could not be captured as an assistant
    /// message (e.g. during compaction summarisation).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Session store failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The branch is too short to compact.
    #[error("cannot compact: {reason}")]
    CannotCompact { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A tool implementation failed. Captured as an error tool result by
    /// the loop; surfaced directly only by host-invoked helpers.
    #[error("tool `{tool_name}` failed: {reason}")]
    ToolFailed { tool_name: String, reason: String },

    /// Catch-all for unexpected internal errors.
    #[error("internal agent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;
