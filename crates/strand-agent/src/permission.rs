//! Pre-execution permission checks.
//!
//! The loop consults a [`PermissionHandler`] before invoking any tool. A
//! `NeedsConfirmation` outcome hands control to the handler's `confirm`,
//! which is expected to suspend until the host UI resolves it one way or
//! the other; the loop only ever sees an effective allow or deny.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Run the tool.
    Allow,
    /// Refuse; the reason becomes an error tool result the model sees.
    Deny {
        reason: String,
    },
    /// Ask the host to confirm before running.
    NeedsConfirmation {
        reason: String,
    },
}

/// Host-supplied safety gate.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    /// Classify one tool invocation.
    async fn check(&self, tool_name: &str, arguments: &Map<String, Value>) -> PermissionDecision;

    /// Resolve a `NeedsConfirmation` outcome. Returning `false` denies.
    async fn confirm(
        &self,
        _tool_name: &str,
        _arguments: &Map<String, Value>,
        _reason: &str,
    ) -> bool {
        false
    }
}

/// Permission handler that allows everything. The default when the host
/// does not install one.
pub struct AllowAll;

#[async_trait]
impl PermissionHandler for AllowAll {
    async fn check(&self, _tool_name: &str, _arguments: &Map<String, Value>) -> PermissionDecision {
        PermissionDecision::Allow
    }
}
