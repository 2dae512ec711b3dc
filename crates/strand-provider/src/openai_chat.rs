//! OpenAI Chat Completions adapter (also used by OpenAI-compatible
//! gateways).
//!
//! Request side: a flat message list with `system`/`user`/`assistant`/`tool`
//! roles; assistant tool calls live in a `tool_calls` array; tool results
//! are role `tool` with a `tool_call_id`. Thinking blocks are dropped on
//! the way out (the API does not carry them); `reasoning_effort` is set
//! when reasoning is enabled.
//!
//! Response side: `data:` chunks carrying `choices[0].delta`, terminated by
//! a `[DONE]` sentinel. Text deltas concatenate; tool-call deltas are
//! correlated by their `index` field (the id and name typically arrive in
//! the first chunk, argument fragments in the rest). Some compatible
//! providers stream reasoning as `delta.reasoning_content`; it is decoded
//! into thinking blocks. Usage arrives in the final chunk before `[DONE]`.

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
use crate::provider::{
    run_sse_stream, AssistantEventStream, Context, Provider, SseHandler, StreamOptions,
};
use crate::sink::EventSink;
use crate::sse::SseEvent;

/// Default OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Adapter for the Chat Completions API.
#[derive(Debug)]
pub struct OpenAiChatProvider {
    http: reqwest::Client,
}

impl OpenAiChatProvider {
    /// Create an adapter with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }
}

impl Default for OpenAiChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OpenAiChatProvider {
    fn api(&self) -> Api {
        Api::OpenAiChat
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
            "{}/v1/chat/completions",
            model.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
        );
        let mut headers = vec![
            (
                "authorization".to_owned(),
                format!("Bearer {}", options.api_key),
            ),
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
        "messages": wire_messages(context),
        "stream": true,
        "stream_options": {"include_usage": true},
        "max_tokens": options.max_tokens.unwrap_or(model.max_tokens),
    });

    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }

    if !context.tools.is_empty() {
        let tools: Vec<Value> = context
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    if model.reasoning && options.thinking_level > ThinkingLevel::Off {
        body["reasoning_effort"] = json!(reasoning_effort(options.thinking_level));
    }

    body
}

/// Map a thinking level onto the three-step `reasoning_effort` scale.
fn reasoning_effort(level: ThinkingLevel) -> &'static str {
    match level {
        ThinkingLevel::Off | ThinkingLevel::Minimal | ThinkingLevel::Low => "low",
        ThinkingLevel::Medium => "medium",
        ThinkingLevel::High | ThinkingLevel::XHigh => "high",
    }
}

fn wire_messages(context: &Context) -> Vec<Value> {
    let mut wire = Vec::with_capacity(context.messages.len() + 1);
    if let Some(system) = &context.system_prompt {
        wire.push(json!({"role": "system", "content": system}));
    }

    for message in &context.messages {
        match message {
            Message::User { content, .. } => wire.push(json!({
                "role": "user",
                "content": user_content(content),
            })),

            Message::Assistant { content, .. } => {
                // Thinking blocks are not carried by this API.
                let text: String = content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                let tool_calls: Vec<Value> = content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolCall(call) => Some(json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.arguments.clone()).to_string(),
                            },
                        })),
                        _ => None,
                    })
                    .collect();

                if text.is_empty() && tool_calls.is_empty() {
                    continue;
                }
                let mut entry = json!({"role": "assistant"});
                entry["content"] = if text.is_empty() {
                    Value::Null
                } else {
                    json!(text)
                };
                if !tool_calls.is_empty() {
                    entry["tool_calls"] = json!(tool_calls);
                }
                wire.push(entry);
            }

            Message::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                let text: String = content
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": text,
                }));
            }
        }
    }
    wire
}

fn user_content(content: &UserContent) -> Value {
    match content {
        UserContent::Text(text) => json!(text),
        UserContent::Parts(parts) => json!(parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::Image { media_type, data } => json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:{media_type};base64,{data}")},
                }),
            })
            .collect::<Vec<_>>()),
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Decoder {
    started: bool,
    /// Provider tool-call index -> sink block index.
    tool_calls: HashMap<u64, usize>,
}

impl Decoder {
    async fn ensure_started(&mut self, chunk: &Value, sink: &mut EventSink) {
        if self.started {
            return;
        }
        self.started = true;
        if let Some(id) = chunk["id"].as_str() {
            sink.set_message_id(id);
        }
        sink.start().await;
    }
}

#[async_trait]
impl SseHandler for Decoder {
    async fn handle(&mut self, event: SseEvent, sink: &mut EventSink) {
        let data = event.data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            sink.done(None).await;
            return;
        }

        let chunk: Value = match serde_json::from_str(data) {
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

        self.ensure_started(&chunk, sink).await;

        // Some gateways surface errors as an in-stream object.
        if let Some(message) = chunk["error"]["message"].as_str() {
            sink.fail(ProviderError::new(ErrorKind::Api, message)).await;
            return;
        }

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            sink.merge_usage(usage_from(usage));
        }

        let Some(choice) = chunk["choices"].get(0) else {
            return;
        };
        let delta = &choice["delta"];

        if let Some(reasoning) = delta["reasoning_content"].as_str() {
            let index = sink.ensure_thinking().await;
            sink.thinking_delta(index, reasoning).await;
        }

        if let Some(content) = delta["content"].as_str() {
            let index = sink.ensure_text().await;
            sink.text_delta(index, content).await;
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for call in tool_calls {
                let provider_index = call["index"].as_u64().unwrap_or(0);
                let function = &call["function"];

                let index = match self.tool_calls.get(&provider_index) {
                    Some(&index) => index,
                    None => {
                        let id = call["id"].as_str().map(str::to_owned);
                        let name = function["name"].as_str().unwrap_or_default();
                        let index = sink.open_tool_call(id, name).await;
                        self.tool_calls.insert(provider_index, index);
                        index
                    }
                };

                if let Some(fragment) = function["arguments"].as_str() {
                    sink.tool_call_delta(index, fragment).await;
                }
            }
        }

        if let Some(finish) = choice["finish_reason"].as_str() {
            sink.set_stop_reason(map_finish_reason(finish));
        }
    }
}

fn map_finish_reason(s: &str) -> StopReason {
    match s {
        "length" => StopReason::Length,
        "tool_calls" => StopReason::ToolUse,
        other => {
            if other != "stop" {
                trace!(finish_reason = other, "mapping unknown finish reason to stop");
            }
            StopReason::Stop
        }
    }
}

fn usage_from(v: &Value) -> Usage {
    Usage {
        input: v["prompt_tokens"].as_u64().unwrap_or(0),
        output: v["completion_tokens"].as_u64().unwrap_or(0),
        cache_read: v["prompt_tokens_details"]["cached_tokens"]
            .as_u64()
            .unwrap_or(0),
        cache_write: 0,
        total: v["total_tokens"].as_u64().unwrap_or(0),
        cost: 0.0,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
