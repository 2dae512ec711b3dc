//! Tool trait and table.
//!
//! A tool is a named capability the model can invoke: name, label,
//! description, a JSON-schema parameter declaration, and an async
//! `execute`. Long-running tools may push partial output through the
//! update callback; the loop forwards those as `ToolExecutionUpdate`
//! events.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use strand_protocol::{ContentPart, ToolDefinition};

use crate::error::Result;

/// Output of a tool invocation (final or partial).
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Text and/or image content fed back to the model.
    pub content: Vec<ContentPart>,
    /// Whether the invocation failed.
    pub is_error: bool,
}

impl ToolOutput {
    /// A successful text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(text)],
            is_error: false,
        }
    }

    /// A failed text output.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(text)],
            is_error: true,
        }
    }
}

/// Callback a long-running tool uses to push partial output.
pub type ToolUpdateFn = Arc<dyn Fn(ToolOutput) + Send + Sync>;

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, matched against tool-call names from the model.
    fn name(&self) -> &str;

    /// Short human-readable label. Defaults to the name.
    fn label(&self) -> &str {
        self.name()
    }

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters(&self) -> Value;

    /// Run the tool. `call_id` is the provider-assigned id of the
    /// originating tool call; `on_update` (when supplied) accepts partial
    /// output from long-running tools.
    async fn execute(
        &self,
        call_id: &str,
        arguments: &Map<String, Value>,
        on_update: Option<ToolUpdateFn>,
    ) -> Result<ToolOutput>;
}

/// The set of tools available to one agent invocation, keyed by name.
#[derive(Default, Clone)]
pub struct ToolTable {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Whether the table has no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The definitions sent to the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_owned(),
                description: t.description().to_owned(),
                parameters: t.parameters(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(
            &self,
            _call_id: &str,
            arguments: &Map<String, Value>,
            _on_update: Option<ToolUpdateFn>,
        ) -> Result<ToolOutput> {
            Ok(ToolOutput::text(
                arguments["text"].as_str().unwrap_or_default(),
            ))
        }
    }

    #[test]
    fn table_resolves_by_name() {
        let mut table = ToolTable::new();
        table.register(Arc::new(Echo));
        assert!(table.get("echo").is_some());
        assert!(table.get("missing").is_none());
        assert_eq!(table.definitions().len(), 1);
        assert_eq!(table.definitions()[0].name, "echo");
    }

    #[test]
    fn registering_same_name_replaces() {
        let mut table = ToolTable::new();
        table.register(Arc::new(Echo));
        table.register(Arc::new(Echo));
        assert_eq!(table.definitions().len(), 1);
    }
}
