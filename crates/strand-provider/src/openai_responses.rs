//! OpenAI Responses API adapter.
//!
//! Request side: an `input` array of typed items. User content uses
//! `input_text`/`input_image` parts; assistant history is re-encoded as
//! `message` (with `output_text` parts), `reasoning`, and `function_call`
//! items; tool results are `function_call_output` items. `reasoning.effort`
//! uses the same three-step mapping as Chat Completions.
//!
//! Response side: `response.*` SSE events. Incremental deltas are forwarded
//! live; the final `response.completed` frame carries usage. If the stream
//! ends without `response.completed`, a terminal is synthesized best-effort
//! (tool-use when the accumulated message has tool calls, stop otherwise).

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

/// Adapter for the Responses API.
#[derive(Debug)]
pub struct OpenAiResponsesProvider {
    http: reqwest::Client,
}

impl OpenAiResponsesProvider {
    /// Create an adapter with a fresh HTTP client.
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }
}

impl Default for OpenAiResponsesProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for OpenAiResponsesProvider {
    fn api(&self) -> Api {
        Api::OpenAiResponses
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
            "{}/v1/responses",
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
        "input": input_items(&context.messages),
        "stream": true,
        "max_output_tokens": options.max_tokens.unwrap_or(model.max_tokens),
        "store": false,
    });

    if let Some(system) = &context.system_prompt {
        body["instructions"] = json!(system);
    }

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
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    if model.reasoning && options.thinking_level > ThinkingLevel::Off {
        body["reasoning"] = json!({"effort": reasoning_effort(options.thinking_level)});
    }

    body
}

fn reasoning_effort(level: ThinkingLevel) -> &'static str {
    match level {
        ThinkingLevel::Off | ThinkingLevel::Minimal | ThinkingLevel::Low => "low",
        ThinkingLevel::Medium => "medium",
        ThinkingLevel::High | ThinkingLevel::XHigh => "high",
    }
}

fn input_items(messages: &[Message]) -> Vec<Value> {
    let mut items = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            Message::User { content, .. } => items.push(json!({
                "type": "message",
                "role": "user",
                "content": user_parts(content),
            })),

            Message::Assistant { content, .. } => {
                for block in content {
                    match block {
                        ContentBlock::Text { text } => {
                            if !text.is_empty() {
                                items.push(json!({
                                    "type": "message",
                                    "role": "assistant",
                                    "content": [{"type": "output_text", "text": text}],
                                }));
                            }
                        }
                        ContentBlock::Thinking { thinking, .. } => items.push(json!({
                            "type": "reasoning",
                            "summary": [{"type": "summary_text", "text": thinking}],
                        })),
                        ContentBlock::ToolCall(call) => items.push(json!({
                            "type": "function_call",
                            "call_id": call.id,
                            "name": call.name,
                            "arguments": Value::Object(call.arguments.clone()).to_string(),
                        })),
                    }
                }
            }

            Message::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                let output: String = content
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                items.push(json!({
                    "type": "function_call_output",
                    "call_id": tool_call_id,
                    "output": output,
                }));
            }
        }
    }
    items
}

fn user_parts(content: &UserContent) -> Vec<Value> {
    match content {
        UserContent::Text(text) => vec![json!({"type": "input_text", "text": text})],
        UserContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => json!({"type": "input_text", "text": text}),
                ContentPart::Image { media_type, data } => json!({
                    "type": "input_image",
                    "image_url": format!("data:{media_type};base64,{data}"),
                }),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Decoder {
    /// Provider `output_index` -> sink block index, for function calls and
    /// reasoning items.
    items: HashMap<u64, usize>,
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
            "response.created" => {
                if let Some(id) = data["response"]["id"].as_str() {
                    sink.set_message_id(id);
                }
                sink.start().await;
            }

            "response.output_item.added" => {
                let output_index = data["output_index"].as_u64().unwrap_or(0);
                let item = &data["item"];
                match item["type"].as_str().unwrap_or_default() {
                    "function_call" => {
                        let id = item["call_id"]
                            .as_str()
                            .or_else(|| item["id"].as_str())
                            .map(str::to_owned);
                        let name = item["name"].as_str().unwrap_or_default();
                        let index = sink.open_tool_call(id, name).await;
                        self.items.insert(output_index, index);
                    }
                    "reasoning" => {
                        let index = sink.open_thinking().await;
                        self.items.insert(output_index, index);
                    }
                    // Message items open their text block on the first
                    // output_text delta.
                    _ => {}
                }
            }

            "response.output_text.delta" => {
                if let Some(delta) = data["delta"].as_str() {
                    let index = sink.ensure_text().await;
                    sink.text_delta(index, delta).await;
                }
            }

            "response.reasoning_summary_text.delta" | "response.reasoning_text.delta" => {
                if let Some(delta) = data["delta"].as_str() {
                    let index = sink.ensure_thinking().await;
                    sink.thinking_delta(index, delta).await;
                }
            }

            "response.function_call_arguments.delta" => {
                let output_index = data["output_index"].as_u64().unwrap_or(0);
                if let (Some(&index), Some(delta)) =
                    (self.items.get(&output_index), data["delta"].as_str())
                {
                    sink.tool_call_delta(index, delta).await;
                }
            }

            "response.output_item.done" => sink.close_open().await,

            "response.completed" => {
                let response = &data["response"];
                sink.merge_usage(usage_from(&response["usage"]));
                sink.done(None).await;
            }

            "response.incomplete" => {
                let response = &data["response"];
                sink.merge_usage(usage_from(&response["usage"]));
                sink.set_stop_reason(StopReason::Length);
                sink.done(None).await;
            }

            "response.failed" => {
                let error = &data["response"]["error"];
                let message = error["message"].as_str().unwrap_or("response failed");
                let kind = match error["code"].as_str().unwrap_or_default() {
                    "rate_limit_exceeded" => ErrorKind::RateLimited,
                    "server_error" => ErrorKind::Server,
                    _ => ErrorKind::Api,
                };
                sink.fail(ProviderError::new(kind, message)).await;
            }

            // Boundary / bookkeeping frames with no canonical counterpart.
            "response.in_progress"
            | "response.content_part.added"
            | "response.content_part.done"
            | "response.output_text.done"
            | "response.function_call_arguments.done"
            | "response.reasoning_summary_part.added"
            | "response.reasoning_summary_text.done" => {}

            other => trace!(event_type = other, "ignoring unknown SSE event type"),
        }
    }
}

fn usage_from(v: &Value) -> Usage {
    Usage {
        input: v["input_tokens"].as_u64().unwrap_or(0),
        output: v["output_tokens"].as_u64().unwrap_or(0),
        cache_read: v["input_tokens_details"]["cached_tokens"]
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use strand_protocol::{AssistantMessageEvent, ModelCost, ToolCallBlock, ToolDefinition};

    fn model() -> LlmModel {
        LlmModel {
            id: "gpt-5".into(),
            name: "GPT-5".into(),
            api: Api::OpenAiResponses,
            provider: "openai".into(),
            base_url: None,
            reasoning: true,
            modalities: Vec::new(),
            cost: ModelCost::default(),
            context_window: 400_000,
            max_tokens: 16_384,
            headers: None,
        }
    }

    #[test]
    fn body_uses_typed_input_items() {
        let mut arguments = Map::new();
        arguments.insert("path".into(), json!("foo.txt"));
        let assistant = Message::Assistant {
            id: "m1".into(),
            content: vec![
                ContentBlock::Text {
                    text: "checking".into(),
                },
                ContentBlock::ToolCall(ToolCallBlock {
                    id: "call_1".into(),
                    name: "read".into(),
                    arguments,
                    thought_signature: None,
                }),
            ],
            api: Api::OpenAiResponses,
            provider: "openai".into(),
            model: "gpt-5".into(),
            usage: None,
            stop_reason: Some(StopReason::ToolUse),
            error: None,
            timestamp: chrono::Utc::now(),
        };
        let context = Context {
            system_prompt: Some("Be terse.".into()),
            messages: vec![
                Message::user("read foo.txt"),
                assistant,
                Message::tool_result("call_1", "read", vec![ContentPart::text("hello")], false),
            ],
            tools: vec![ToolDefinition {
                name: "read".into(),
                description: "Read a file".into(),
                parameters: json!({"type": "object"}),
            }],
        };
        let options = StreamOptions {
            thinking_level: ThinkingLevel::High,
            ..Default::default()
        };
        let body = build_body(&model(), &context, &options);

        assert_eq!(body["instructions"], "Be terse.");
        assert_eq!(body["reasoning"]["effort"], "high");
        assert_eq!(body["tools"][0]["name"], "read");

        let input = body["input"].as_array().unwrap();
        assert_eq!(input[0]["type"], "message");
        assert_eq!(input[0]["content"][0]["type"], "input_text");
        assert_eq!(input[1]["type"], "message");
        assert_eq!(input[1]["content"][0]["type"], "output_text");
        assert_eq!(input[2]["type"], "function_call");
        assert_eq!(input[2]["call_id"], "call_1");
        assert_eq!(input[3]["type"], "function_call_output");
        assert_eq!(input[3]["output"], "hello");
    }

    async fn decode(frames: &[Value]) -> Vec<AssistantMessageEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut sink = EventSink::new(tx, &model());
        let mut decoder = Decoder::default();
        for frame in frames {
            let event = SseEvent {
                event: frame["type"].as_str().map(str::to_owned),
                data: frame.to_string(),
                id: None,
                retry: None,
            };
            decoder.handle(event, &mut sink).await;
            if sink.is_finished() {
                break;
            }
        }
        if !sink.is_finished() {
            decoder.finish(&mut sink).await;
        }
        drop(sink);
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn text_stream_completes_with_usage() {
        let events = decode(&[
            json!({"type":"response.created","response":{"id":"resp_1"}}),
            json!({"type":"response.output_item.added","output_index":0,"item":{"type":"message","role":"assistant"}}),
            json!({"type":"response.output_text.delta","output_index":0,"delta":"Hel"}),
            json!({"type":"response.output_text.delta","output_index":0,"delta":"lo"}),
            json!({"type":"response.output_item.done","output_index":0,"item":{"type":"message"}}),
            json!({"type":"response.completed","response":{"id":"resp_1","usage":{"input_tokens":12,"output_tokens":3,"total_tokens":15}}}),
        ])
        .await;

        match events.last().unwrap() {
            AssistantMessageEvent::Done {
                stop_reason,
                message,
            } => {
                assert_eq!(*stop_reason, StopReason::Stop);
                assert_eq!(message.text(), "Hello");
                assert_eq!(message.id(), "resp_1");
                match message {
                    Message::Assistant { usage, .. } => {
                        assert_eq!(usage.unwrap().total, 15);
                    }
                    other => panic!("unexpected message: {other:?}"),
                }
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn function_call_stream_ends_in_tool_use() {
        let events = decode(&[
            json!({"type":"response.created","response":{"id":"resp_2"}}),
            json!({"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","call_id":"call_9","name":"read"}}),
            json!({"type":"response.function_call_arguments.delta","output_index":0,"delta":"{\"path\":"}),
            json!({"type":"response.function_call_arguments.delta","output_index":0,"delta":"\"foo.txt\"}"}),
            json!({"type":"response.output_item.done","output_index":0,"item":{"type":"function_call"}}),
            json!({"type":"response.completed","response":{"id":"resp_2","usage":{"input_tokens":5,"output_tokens":5,"total_tokens":10}}}),
        ])
        .await;

        match events.last().unwrap() {
            AssistantMessageEvent::Done {
                stop_reason,
                message,
            } => {
                assert_eq!(*stop_reason, StopReason::ToolUse);
                let calls = message.tool_calls();
                assert_eq!(calls[0].id, "call_9");
                assert_eq!(calls[0].arguments["path"], "foo.txt");
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_completed_synthesizes_tool_use_when_calls_present() {
        let events = decode(&[
            json!({"type":"response.created","response":{"id":"resp_3"}}),
            json!({"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","call_id":"call_1","name":"read"}}),
            json!({"type":"response.function_call_arguments.delta","output_index":0,"delta":"{}"}),
        ])
        .await;

        match events.last().unwrap() {
            AssistantMessageEvent::Done { stop_reason, .. } => {
                assert_eq!(*stop_reason, StopReason::ToolUse);
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_response_maps_error_code() {
        let events = decode(&[
            json!({"type":"response.created","response":{"id":"resp_4"}}),
            json!({"type":"response.failed","response":{"id":"resp_4","error":{"code":"rate_limit_exceeded","message":"slow down"}}}),
        ])
        .await;

        match events.last().unwrap() {
            AssistantMessageEvent::Error { error, .. } => {
                assert_eq!(error.kind, ErrorKind::RateLimited);
                assert_eq!(error.message, "slow down");
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }
}
