//! Anthropic Messages API adapter.
//!
//! Request side: the system prompt is a top-level field, tool results are
//! carried as user turns containing `tool_result` blocks, and when
//! reasoning is enabled the request gets a `thinking` object with a token
//! budget while `temperature` is omitted.
//!
//! Response side: the Messages SSE taxonomy (`message_start`,
//! `content_block_*`, `message_delta`, `message_stop`) is decoded into the
//! canonical event set. Usage arrives in both `message_start` and
//! `message_delta`; snapshots are max-merged.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::trace;

use strand_protocol::{
    Api, ContentBlock, ContentPart, ErrorKind, LlmModel, Message, ProviderError, StopReason,
    ThinkingLevel, UserContent, Usage,
};

use crate::http::{build_client, byte_stream, model_headers, post_json, status_error};
use crate::provider::{run_sse_stream, AssistantEventStream, Context, Provider, SseHandler, StreamOptions};
use crate::sink::EventSink;
use crate::sse::SseEvent;

/// Default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic Messages API.
#[derive(Debug)]
pub struct AnthropicProvider {
    http: reqwest::Client,
}

impl AnthropicProvider {
    /// Create an adapter with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn api(&self) -> Api {
        Api::AnthropicMessages
    }

    async fn stream(
        &self,
        model: &LlmModel,
        context: &Context,
        options: &StreamOptions,
    ) -> AssistantEventStream {
        let (tx, rx) = mpsc::channel(256);
        let mut sink = EventSink::new(tx, model);
        let cancel = options.cancel.child_token();

        let body = build_body(model, context, options);
        let url = format!(
            "{}/v1/messages",
            model.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
        );
        let mut headers = vec![
            ("x-api-key".to_owned(), options.api_key.clone()),
            ("anthropic-version".to_owned(), ANTHROPIC_VERSION.to_owned()),
            ("accept".to_owned(), "text/event-stream".to_owned()),
        ];
        headers.extend(model_headers(model));

        let client = self.http.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let sent = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => {
                    sink.fail(ProviderError::aborted()).await;
                    return;
                }
                resp = post_json(&client, &url, &headers, &body) => resp,
            };
            let resp = match sent {
                Ok(resp) => resp,
                Err(err) => {
                    sink.fail(err).await;
                    return;
                }
            };
            if !resp.status().is_success() {
                sink.fail(status_error(resp).await).await;
                return;
            }
            run_sse_stream(byte_stream(resp), Decoder::default(), sink, task_cancel).await;
        });

        AssistantEventStream::new(rx, cancel)
    }
}

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

pub(crate) fn build_body(model: &LlmModel, context: &Context, options: &StreamOptions) -> Value {
    let mut body = json!({
        "model": model.id,
        "max_tokens": options.max_tokens.unwrap_or(model.max_tokens),
        "messages": wire_messages(&context.messages),
        "stream": true,
    });

    if let Some(system) = &context.system_prompt {
        body["system"] = json!(system);
    }

    if !context.tools.is_empty() {
        let tools: Vec<Value> = context
            .tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    // Reasoning takes a token budget and forces temperature off.
    let budget = (model.reasoning && options.thinking_level > ThinkingLevel::Off)
        .then(|| options.thinking_budgets.resolve(options.thinking_level))
        .flatten();
    match budget {
        Some(budget_tokens) => {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget_tokens});
        }
        None => {
            if let Some(temperature) = options.temperature {
                body["temperature"] = json!(temperature);
            }
        }
    }

    body
}

fn wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            Message::User { content, .. } => wire.push(json!({
                "role": "user",
                "content": user_content(content),
            })),

            Message::Assistant { content, .. } => {
                let blocks: Vec<Value> = content.iter().filter_map(assistant_block).collect();
                if !blocks.is_empty() {
                    wire.push(json!({"role": "assistant", "content": blocks}));
                }
            }

            Message::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": parts(content),
                });
                if *is_error {
                    block["is_error"] = json!(true);
                }
                wire.push(json!({"role": "user", "content": [block]}));
            }
        }
    }
    wire
}

fn user_content(content: &UserContent) -> Value {
    match content {
        UserContent::Text(text) => json!(text),
        UserContent::Parts(list) => json!(list.iter().map(part).collect::<Vec<_>>()),
    }
}

fn parts(list: &[ContentPart]) -> Vec<Value> {
    list.iter().map(part).collect()
}

fn part(p: &ContentPart) -> Value {
    match p {
        ContentPart::Text { text } => json!({"type": "text", "text": text}),
        ContentPart::Image { media_type, data } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
    }
}

fn assistant_block(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text } => {
            (!text.is_empty()).then(|| json!({"type": "text", "text": text}))
        }
        ContentBlock::Thinking {
            thinking,
            signature,
        } => {
            let mut v = json!({"type": "thinking", "thinking": thinking});
            if let Some(signature) = signature {
                v["signature"] = json!(signature);
            }
            Some(v)
        }
        ContentBlock::ToolCall(call) => Some(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.arguments,
        })),
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// SSE decode state: maps the provider's block indices onto the sink's.
#[derive(Default)]
struct Decoder {
    blocks: HashMap<u64, usize>,
}

#[async_trait]
impl SseHandler for Decoder {
    async fn handle(&mut self, event: SseEvent, sink: &mut EventSink) {
        if event.data.trim().is_empty() {
            return;
        }
        let data: Value = match serde_json::from_str(&event.data) {
            Ok(v) => v,
            Err(e) => {
                sink.fail(ProviderError::new(
                    ErrorKind::Decoding,
                    format!("invalid JSON in SSE data: {e}"),
                ))
                .await;
                return;
            }
        };
        let kind = event
            .event
            .as_deref()
            .or_else(|| data["type"].as_str())
            .unwrap_or_default()
            .to_owned();

        match kind.as_str() {
            "message_start" => {
                let message = &data["message"];
                if let Some(id) = message["id"].as_str() {
                    sink.set_message_id(id);
                }
                sink.merge_usage(usage_from(&message["usage"]));
                sink.start().await;
            }

            "content_block_start" => {
                let provider_index = data["index"].as_u64().unwrap_or(0);
                let block = &data["content_block"];
                let index = match block["type"].as_str().unwrap_or_default() {
                    "tool_use" => {
                        let id = block["id"].as_str().map(str::to_owned);
                        let name = block["name"].as_str().unwrap_or_default();
                        sink.open_tool_call(id, name).await
                    }
                    "thinking" | "redacted_thinking" => sink.open_thinking().await,
                    _ => sink.open_text().await,
                };
                self.blocks.insert(provider_index, index);
            }

            "content_block_delta" => {
                let provider_index = data["index"].as_u64().unwrap_or(0);
                let Some(&index) = self.blocks.get(&provider_index) else {
                    return;
                };
                let delta = &data["delta"];
                match delta["type"].as_str().unwrap_or_default() {
                    "text_delta" => {
                        sink.text_delta(index, delta["text"].as_str().unwrap_or_default())
                            .await
                    }
                    "thinking_delta" => {
                        sink.thinking_delta(index, delta["thinking"].as_str().unwrap_or_default())
                            .await
                    }
                    "input_json_delta" => {
                        sink.tool_call_delta(
                            index,
                            delta["partial_json"].as_str().unwrap_or_default(),
                        )
                        .await
                    }
                    "signature_delta" => {
                        sink.thinking_signature(
                            index,
                            delta["signature"].as_str().unwrap_or_default(),
                        );
                    }
                    other => trace!(delta_type = other, "ignoring unknown delta type"),
                }
            }

            "content_block_stop" => sink.close_open().await,

            "message_delta" => {
                if let Some(stop) = data["delta"]["stop_reason"].as_str() {
                    sink.set_stop_reason(map_stop_reason(stop));
                }
                sink.merge_usage(usage_from(&data["usage"]));
            }

            "message_stop" => sink.done(None).await,

            "ping" => {}

            "error" => {
                let error = &data["error"];
                let message = error["message"].as_str().unwrap_or("provider error");
                let kind = match error["type"].as_str().unwrap_or_default() {
                    "overloaded_error" => ErrorKind::Overloaded,
                    "rate_limit_error" => ErrorKind::RateLimited,
                    "api_error" => ErrorKind::Server,
                    _ => ErrorKind::Api,
                };
                sink.fail(ProviderError::new(kind, message)).await;
            }

            other => trace!(event_type = other, "ignoring unknown SSE event type"),
        }
    }
}

fn map_stop_reason(s: &str) -> StopReason {
    match s {
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        // end_turn, stop_sequence, and anything new read as a natural stop.
        _ => StopReason::Stop,
    }
}

fn usage_from(v: &Value) -> Usage {
    Usage {
        input: v["input_tokens"].as_u64().unwrap_or(0),
        output: v["output_tokens"].as_u64().unwrap_or(0),
        cache_read: v["cache_read_input_tokens"].as_u64().unwrap_or(0),
        cache_write: v["cache_creation_input_tokens"].as_u64().unwrap_or(0),
        total: 0,
        cost: 0.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
