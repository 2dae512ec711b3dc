//! The `Provider` trait and the event stream it returns.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use strand_protocol::{
    Api, AssistantMessageEvent, LlmModel, Message, ProviderError, ThinkingBudgets, ThinkingLevel,
    ToolDefinition,
};

use crate::sink::EventSink;
use crate::sse::{SseDecoder, SseEvent};

/// The neutral request a provider translates into its wire format: system
/// prompt, LLM-visible message list, and tool definitions.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// System prompt, when one is configured.
    pub system_prompt: Option<String>,
    /// Conversation messages, oldest first. Custom records have already
    /// been filtered out by the caller.
    pub messages: Vec<Message>,
    /// Tools the model may invoke.
    pub tools: Vec<ToolDefinition>,
}

/// Per-request knobs.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Key for the provider's auth scheme.
    pub api_key: String,
    /// Reasoning intensity for this request.
    pub thinking_level: ThinkingLevel,
    /// Overrides of the default per-level budgets.
    pub thinking_budgets: ThinkingBudgets,
    /// Sampling temperature. Omitted on the wire when reasoning is enabled
    /// and the API requires it.
    pub temperature: Option<f32>,
    /// Output token cap; falls back to the model's `max_tokens`.
    pub max_tokens: Option<u32>,
    /// Cancelling this token aborts the HTTP request and terminates the
    /// stream with an `Aborted` error event.
    pub cancel: CancellationToken,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            thinking_level: ThinkingLevel::Off,
            thinking_budgets: ThinkingBudgets::default(),
            temperature: None,
            max_tokens: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// A lazy channel of [`AssistantMessageEvent`]s carrying exactly one
/// terminal event. Dropping the stream cancels the underlying request.
pub struct AssistantEventStream {
    rx: mpsc::Receiver<AssistantMessageEvent>,
    cancel: CancellationToken,
}

impl AssistantEventStream {
    pub(crate) fn new(rx: mpsc::Receiver<AssistantMessageEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Build a stream from a pre-recorded event sequence (mock providers).
    pub fn from_events(events: Vec<AssistantMessageEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        let cancel = CancellationToken::new();
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Self::new(rx, cancel)
    }

    /// Next event, or `None` once the channel is closed after the terminal
    /// event.
    pub async fn next(&mut self) -> Option<AssistantMessageEvent> {
        self.rx.recv().await
    }

    /// Abort the underlying request. The stream still terminates with an
    /// `Error` event classified as `Aborted`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for AssistantEventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A stateless adapter translating neutral requests into one remote LLM
/// API and its SSE taxonomy back into the canonical event set.
///
/// Implementations never panic and never return early errors: every
/// failure, including request construction and non-2xx responses, surfaces
/// as a terminal `Error` event on the returned stream.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// The wire API this adapter speaks.
    fn api(&self) -> Api;

    /// Start one streaming completion.
    async fn stream(
        &self,
        model: &LlmModel,
        context: &Context,
        options: &StreamOptions,
    ) -> AssistantEventStream;
}

/// Per-provider SSE decode state.
#[async_trait]
pub(crate) trait SseHandler: Send {
    /// Decode one SSE event into canonical events on the sink.
    async fn handle(&mut self, event: SseEvent, sink: &mut EventSink);

    /// The byte stream ended without the provider's own terminal frame.
    /// Default: synthesize `Done` (tool-use when the accumulated message
    /// carries tool calls, stop otherwise).
    async fn finish(&mut self, sink: &mut EventSink) {
        sink.done(None).await;
    }
}

/// Drive an SSE byte stream through a provider decoder until a terminal
/// event is emitted or the caller cancels.
pub(crate) async fn run_sse_stream<H, S>(
    mut byte_stream: S,
    mut handler: H,
    mut sink: EventSink,
    cancel: CancellationToken,
) where
    H: SseHandler,
    S: Stream<Item = Result<Bytes, ProviderError>> + Unpin,
{
    let mut decoder = SseDecoder::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                sink.fail(ProviderError::aborted()).await;
                return;
            }
            chunk = byte_stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    for event in decoder.feed(&bytes) {
                        handler.handle(event, &mut sink).await;
                        if sink.is_finished() {
                            return;
                        }
                    }
                }
                Some(Err(err)) => {
                    sink.fail(err).await;
                    return;
                }
                None => {
                    if let Some(event) = decoder.finish() {
                        handler.handle(event, &mut sink).await;
                    }
                    if !sink.is_finished() {
                        handler.finish(&mut sink).await;
                    }
                    return;
                }
            }
        }
    }
}
