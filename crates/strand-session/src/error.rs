//! Session store error types.

use uuid::Uuid;

/// Unified error type for the session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The file's first line is missing or is not a header entry.
    #[error("session file has no header line")]
    MissingHeader,

    /// The header's schema version is older than we support.
    #[error("unsupported session version {found} (minimum {minimum})")]
    UnsupportedVersion { found: u32, minimum: u32 },

    /// A branch target or parent id does not exist in this session.
    #[error("unknown entry id: {id}")]
    UnknownEntry { id: Uuid },

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure (decoding failures of individual lines are
    /// tolerated by the reader and never surface here).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the session crate.
pub type Result<T> = std::result::Result<T, SessionError>;
