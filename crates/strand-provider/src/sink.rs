//! Accumulates canonical events into the final assistant message.
//!
//! Every provider decoder drives an [`EventSink`]: it forwards each
//! canonical event downstream as it is produced and keeps enough state to
//! materialise the final [`Message`] for the terminal event. The sink also
//! enforces the block-index discipline: indices are assigned sequentially
//! as blocks open, opening a block closes any block still open, and
//! tool-call arguments are parsed exactly once when their block closes.

use chrono::Utc;
use serde_json::Map;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use strand_protocol::{
    Api, AssistantError, AssistantMessageEvent, ContentBlock, LlmModel, Message, ModelCost,
    ProviderError, StopReason, ToolCallBlock, Usage,
};

enum BlockState {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    ToolCall {
        id: String,
        name: String,
        arguments_json: String,
        thought_signature: Option<String>,
    },
}

impl BlockState {
    fn to_content(&self) -> ContentBlock {
        match self {
            Self::Text { text } => ContentBlock::Text { text: text.clone() },
            Self::Thinking {
                thinking,
                signature,
            } => ContentBlock::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone(),
            },
            Self::ToolCall {
                id,
                name,
                arguments_json,
                thought_signature,
            } => ContentBlock::ToolCall(ToolCallBlock {
                id: id.clone(),
                name: name.clone(),
                arguments: parse_arguments(name, arguments_json),
                thought_signature: thought_signature.clone(),
            }),
        }
    }
}

/// Concatenated argument fragments are parsed once, here. A failure yields
/// an empty map; the tool layer rejects it at validation.
fn parse_arguments(name: &str, raw: &str) -> Map<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!(tool = name, "tool call arguments did not parse as an object");
            Map::new()
        }
    }
}

/// Event sink shared by all provider decoders.
pub(crate) struct EventSink {
    tx: mpsc::Sender<AssistantMessageEvent>,

    message_id: String,
    api: Api,
    provider: String,
    model_id: String,
    cost: ModelCost,

    blocks: Vec<BlockState>,
    open: Option<usize>,
    usage: Usage,
    stop_reason: Option<StopReason>,
    finished: bool,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<AssistantMessageEvent>, model: &LlmModel) -> Self {
        Self {
            tx,
            message_id: Uuid::new_v4().to_string(),
            api: model.api,
            provider: model.provider.clone(),
            model_id: model.id.clone(),
            cost: model.cost,
            blocks: Vec::new(),
            open: None,
            usage: Usage::default(),
            stop_reason: None,
            finished: false,
        }
    }

    /// Whether a terminal event has been emitted.
    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Adopt the provider-assigned message id.
    pub(crate) fn set_message_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.message_id = id;
        }
    }

    /// Record the provider-reported stop reason for the terminal event.
    pub(crate) fn set_stop_reason(&mut self, stop: StopReason) {
        self.stop_reason = Some(stop);
    }

    /// Max-merge a usage snapshot (providers may report several).
    pub(crate) fn merge_usage(&mut self, other: Usage) {
        self.usage.merge_max(&other);
    }

    async fn send(&mut self, event: AssistantMessageEvent) {
        if self.tx.send(event).await.is_err() {
            // Receiver hung up; stop producing.
            self.finished = true;
        }
    }

    /// Emit the `Start` event with the (empty) message shell.
    pub(crate) async fn start(&mut self) {
        let message = self.snapshot(None, None);
        self.send(AssistantMessageEvent::Start { message }).await;
    }

    /// Open a text block, closing any open block first.
    pub(crate) async fn open_text(&mut self) -> usize {
        self.close_open().await;
        let index = self.blocks.len();
        self.blocks.push(BlockState::Text {
            text: String::new(),
        });
        self.open = Some(index);
        self.send(AssistantMessageEvent::TextStart { index }).await;
        index
    }

    /// The open text block's index, opening one if necessary.
    pub(crate) async fn ensure_text(&mut self) -> usize {
        match self.open {
            Some(index) if matches!(self.blocks[index], BlockState::Text { .. }) => index,
            _ => self.open_text().await,
        }
    }

    /// Open a thinking block, closing any open block first.
    pub(crate) async fn open_thinking(&mut self) -> usize {
        self.close_open().await;
        let index = self.blocks.len();
        self.blocks.push(BlockState::Thinking {
            thinking: String::new(),
            signature: None,
        });
        self.open = Some(index);
        self.send(AssistantMessageEvent::ThinkingStart { index })
            .await;
        index
    }

    /// The open thinking block's index, opening one if necessary.
    pub(crate) async fn ensure_thinking(&mut self) -> usize {
        match self.open {
            Some(index) if matches!(self.blocks[index], BlockState::Thinking { .. }) => index,
            _ => self.open_thinking().await,
        }
    }

    /// Open a tool-call block, closing any open block first. Generates a
    /// v4 UUID when the provider did not supply a call id.
    pub(crate) async fn open_tool_call(
        &mut self,
        id: Option<String>,
        name: impl Into<String>,
    ) -> usize {
        self.close_open().await;
        let id = id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = name.into();
        let index = self.blocks.len();
        self.blocks.push(BlockState::ToolCall {
            id: id.clone(),
            name: name.clone(),
            arguments_json: String::new(),
            thought_signature: None,
        });
        self.open = Some(index);
        self.send(AssistantMessageEvent::ToolCallStart { index, id, name })
            .await;
        index
    }

    /// Append a text delta to the block at `index`.
    pub(crate) async fn text_delta(&mut self, index: usize, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if let Some(BlockState::Text { text }) = self.blocks.get_mut(index) {
            text.push_str(delta);
            self.send(AssistantMessageEvent::TextDelta {
                index,
                delta: delta.to_owned(),
            })
            .await;
        }
    }

    /// Append a thinking delta to the block at `index`.
    pub(crate) async fn thinking_delta(&mut self, index: usize, delta: &str) {
        if delta.is_empty() {
            return;
        }
        if let Some(BlockState::Thinking { thinking, .. }) = self.blocks.get_mut(index) {
            thinking.push_str(delta);
            self.send(AssistantMessageEvent::ThinkingDelta {
                index,
                delta: delta.to_owned(),
            })
            .await;
        }
    }

    /// Attach a signature to the thinking block at `index` (no event).
    pub(crate) fn thinking_signature(&mut self, index: usize, sig: &str) {
        if let Some(BlockState::Thinking { signature, .. }) = self.blocks.get_mut(index) {
            *signature = Some(sig.to_owned());
        }
    }

    /// Append a raw JSON argument fragment to the tool call at `index`.
    pub(crate) async fn tool_call_delta(&mut self, index: usize, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if let Some(BlockState::ToolCall { arguments_json, .. }) = self.blocks.get_mut(index) {
            arguments_json.push_str(fragment);
            self.send(AssistantMessageEvent::ToolCallDelta {
                index,
                delta: fragment.to_owned(),
            })
            .await;
        }
    }

    /// Close the currently open block, emitting its end event.
    pub(crate) async fn close_open(&mut self) {
        let Some(index) = self.open.take() else {
            return;
        };
        let event = match &self.blocks[index] {
            BlockState::Text { text } => AssistantMessageEvent::TextEnd {
                index,
                text: text.clone(),
            },
            BlockState::Thinking { thinking, .. } => AssistantMessageEvent::ThinkingEnd {
                index,
                thinking: thinking.clone(),
            },
            BlockState::ToolCall {
                id,
                name,
                arguments_json,
                thought_signature,
            } => AssistantMessageEvent::ToolCallEnd {
                index,
                call: ToolCallBlock {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: parse_arguments(name, arguments_json),
                    thought_signature: thought_signature.clone(),
                },
            },
        };
        self.send(event).await;
    }

    /// Whether any tool-call block has been accumulated.
    pub(crate) fn has_tool_calls(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, BlockState::ToolCall { .. }))
    }

    /// Emit the terminal `Done` event. `stop` overrides any recorded stop
    /// reason; when neither is present one is synthesized: `ToolUse` if the
    /// message carries tool calls, else `Stop`.
    pub(crate) async fn done(&mut self, stop: Option<StopReason>) {
        if self.finished {
            return;
        }
        self.close_open().await;
        let stop = stop.or(self.stop_reason).unwrap_or(if self.has_tool_calls() {
            StopReason::ToolUse
        } else {
            StopReason::Stop
        });
        self.usage.finalize(&self.cost);
        let message = self.snapshot(Some(stop), None);
        self.send(AssistantMessageEvent::Done {
            stop_reason: stop,
            message,
        })
        .await;
        self.finished = true;
    }

    /// Emit the terminal `Error` event carrying the partial message.
    pub(crate) async fn fail(&mut self, error: ProviderError) {
        if self.finished {
            return;
        }
        let stop = if error.kind == strand_protocol::ErrorKind::Aborted {
            StopReason::Aborted
        } else {
            StopReason::Error
        };
        self.usage.finalize(&self.cost);
        let message = self.snapshot(Some(stop), Some(AssistantError::from(&error)));
        self.send(AssistantMessageEvent::Error {
            stop_reason: stop,
            error,
            message,
        })
        .await;
        self.finished = true;
    }

    fn snapshot(&self, stop_reason: Option<StopReason>, error: Option<AssistantError>) -> Message {
        let usage = (self.usage != Usage::default()).then_some(self.usage);
        Message::Assistant {
            id: self.message_id.clone(),
            content: self.blocks.iter().map(BlockState::to_content).collect(),
            api: self.api,
            provider: self.provider.clone(),
            model: self.model_id.clone(),
            usage,
            stop_reason,
            error,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strand_protocol::ErrorKind;

    fn model() -> LlmModel {
        LlmModel {
            id: "test-model".into(),
            name: "Test".into(),
            api: Api::AnthropicMessages,
            provider: "anthropic".into(),
            base_url: None,
            reasoning: false,
            modalities: Vec::new(),
            cost: ModelCost::default(),
            context_window: 100_000,
            max_tokens: 4096,
            headers: None,
        }
    }

    async fn drain(rx: &mut mpsc::Receiver<AssistantMessageEvent>) -> Vec<AssistantMessageEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn blocks_get_sequential_indices_and_matched_ends() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut sink = EventSink::new(tx, &model());

        sink.start().await;
        let t = sink.open_text().await;
        sink.text_delta(t, "hi").await;
        let c = sink.open_tool_call(Some("tc_1".into()), "read").await;
        sink.tool_call_delta(c, r#"{"path":"a.txt"}"#).await;
        sink.done(None).await;

        let events = drain(&mut rx).await;
        assert!(matches!(events[0], AssistantMessageEvent::Start { .. }));
        assert!(matches!(
            events[1],
            AssistantMessageEvent::TextStart { index: 0 }
        ));
        // Opening the tool call closed the text block first.
        assert!(matches!(
            events[3],
            AssistantMessageEvent::TextEnd { index: 0, .. }
        ));
        assert!(matches!(
            events[4],
            AssistantMessageEvent::ToolCallStart { index: 1, .. }
        ));
        let last = events.last().unwrap();
        match last {
            AssistantMessageEvent::Done {
                stop_reason,
                message,
            } => {
                // No explicit stop reason: synthesized from tool calls.
                assert_eq!(*stop_reason, StopReason::ToolUse);
                let calls = message.tool_calls();
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].arguments["path"], "a.txt");
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_arguments_become_empty_map() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut sink = EventSink::new(tx, &model());
        let c = sink.open_tool_call(Some("tc_1".into()), "read").await;
        sink.tool_call_delta(c, r#"{"path": <garbage"#).await;
        sink.done(None).await;

        let events = drain(&mut rx).await;
        let done = events.last().unwrap();
        match done {
            AssistantMessageEvent::Done { message, .. } => {
                assert!(message.tool_calls()[0].arguments.is_empty());
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_call_id_gets_generated() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx, &model());
        sink.open_tool_call(None, "read").await;
        sink.done(None).await;
        let events = drain(&mut rx).await;
        match &events[0] {
            AssistantMessageEvent::ToolCallStart { id, .. } => {
                assert!(Uuid::parse_str(id).is_ok());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fail_emits_error_with_partial_message() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx, &model());
        let t = sink.open_text().await;
        sink.text_delta(t, "partial").await;
        sink.fail(ProviderError::new(ErrorKind::Overloaded, "529")).await;

        let events = drain(&mut rx).await;
        match events.last().unwrap() {
            AssistantMessageEvent::Error {
                stop_reason,
                error,
                message,
            } => {
                assert_eq!(*stop_reason, StopReason::Error);
                assert_eq!(error.kind, ErrorKind::Overloaded);
                assert_eq!(message.text(), "partial");
                assert_eq!(message.error().unwrap().kind, ErrorKind::Overloaded);
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_is_emitted_once() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx, &model());
        sink.done(Some(StopReason::Stop)).await;
        sink.done(Some(StopReason::Stop)).await;
        sink.fail(ProviderError::aborted()).await;
        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn usage_snapshots_max_merge() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut sink = EventSink::new(tx, &model());
        sink.merge_usage(Usage {
            input: 100,
            output: 1,
            ..Default::default()
        });
        sink.merge_usage(Usage {
            input: 100,
            output: 42,
            ..Default::default()
        });
        sink.done(Some(StopReason::Stop)).await;
        let events = drain(&mut rx).await;
        match events.last().unwrap() {
            AssistantMessageEvent::Done { message, .. } => match message {
                Message::Assistant { usage, .. } => {
                    let usage = usage.unwrap();
                    assert_eq!(usage.input, 100);
                    assert_eq!(usage.output, 42);
                }
                other => panic!("unexpected message: {other:?}"),
            },
            other => panic!("unexpected terminal: {other:?}"),
        }
    }
}
