//! The agent loop.
//!
//! Alternates model turns with tool execution until the model stops
//! requesting tools or a safety limit trips. Structure:
//!
//! - *Inner loop*: build the LLM-visible context, stream one assistant
//!   response, execute any tool calls sequentially in the order the model
//!   emitted them, append each result, and iterate while the turn produced
//!   tool calls. Steering messages injected during tool execution
//!   short-circuit the remaining calls of that turn.
//! - *Outer loop*: when the inner loop exits cleanly, consult the follow-up
//!   queue; a non-empty result re-enters the inner loop.
//!
//! A global turn counter (default 50) bounds the run: on overflow a
//! synthetic assistant error message is appended and both loops terminate.
//! Cancellation is cooperative and one-shot: every await is a legal
//! cancellation point, the active provider stream and tool are signalled,
//! and the final `AgentEnd` event carries the partial transcript.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use strand_protocol::{
    AgentMessage, AssistantError, AssistantMessageEvent, ContentPart, ErrorKind, LlmModel, Message,
    StopReason, ThinkingBudgets, ThinkingLevel, ToolCallBlock, UserContent,
};
use strand_provider::throttle::{coalesce, ThrottleConfig};
use strand_provider::{Context, ProviderRegistry, StreamOptions};
use strand_vault::KeyStore;

use crate::error::Result;
use crate::events::AgentEvent;
use crate::permission::{AllowAll, PermissionDecision, PermissionHandler};
use crate::tool::{ToolOutput, ToolTable, ToolUpdateFn};
use crate::validate::validate_arguments;

/// Placeholder result for tool calls short-circuited by steering.
const STEERING_SKIP_TEXT: &str = "Tool call skipped due to steering message";

/// How follow-up messages are drained at inner-loop exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FollowUpMode {
    /// Drain the whole queue.
    #[default]
    All,
    /// Pop a single message per inner-loop exit.
    OneAtATime,
}

/// Loop configuration.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum inner-loop iterations per run.
    pub max_turns: u32,
    /// Follow-up delivery mode.
    pub follow_up_mode: FollowUpMode,
    /// Optional delta coalescing between the provider stream and the
    /// event bus.
    pub throttle: Option<ThrottleConfig>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            follow_up_mode: FollowUpMode::All,
            throttle: None,
        }
    }
}

/// A mutex-guarded FIFO the host pushes messages into from other tasks.
#[derive(Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Mutex<VecDeque<AgentMessage>>>,
}

impl MessageQueue {
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AgentMessage>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a message.
    pub fn push(&self, message: impl Into<AgentMessage>) {
        self.lock().push_back(message.into());
    }

    /// Take every queued message.
    pub fn drain_all(&self) -> Vec<AgentMessage> {
        self.lock().drain(..).collect()
    }

    /// Take the oldest queued message.
    pub fn pop(&self) -> Option<AgentMessage> {
        self.lock().pop_front()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Host callback resolving an API key for a provider name.
pub type ApiKeyFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Host callback rewriting the LLM-visible message list before a request.
pub type TransformContextFn = Arc<dyn Fn(Vec<Message>) -> Vec<Message> + Send + Sync>;

/// One agent: a model, a tool table, a transcript, and the loop that
/// drives them.
pub struct Agent {
    registry: Arc<ProviderRegistry>,
    model: LlmModel,
    tools: ToolTable,
    config: LoopConfig,

    system_prompt: Option<String>,
    thinking_level: ThinkingLevel,
    thinking_budgets: ThinkingBudgets,
    temperature: Option<f32>,

    messages: Vec<AgentMessage>,
    steering: MessageQueue,
    follow_up: MessageQueue,
    cancel: CancellationToken,

    permission: Arc<dyn PermissionHandler>,
    api_key: Option<ApiKeyFn>,
    transform_context: Option<TransformContextFn>,
    events: Option<mpsc::Sender<AgentEvent>>,
}

impl Agent {
    /// Create an agent for `model` with no tools and default config.
    pub fn new(registry: Arc<ProviderRegistry>, model: LlmModel) -> Self {
        Self {
            registry,
            model,
            tools: ToolTable::new(),
            config: LoopConfig::default(),
            system_prompt: None,
            thinking_level: ThinkingLevel::Off,
            thinking_budgets: ThinkingBudgets::default(),
            temperature: None,
            messages: Vec::new(),
            steering: MessageQueue::default(),
            follow_up: MessageQueue::default(),
            cancel: CancellationToken::new(),
            permission: Arc::new(AllowAll),
            api_key: None,
            transform_context: None,
            events: None,
        }
    }

    // -- builder-style configuration ----------------------------------------

    pub fn with_tools(mut self, tools: ToolTable) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_thinking_level(mut self, level: ThinkingLevel) -> Self {
        self.thinking_level = level;
        self
    }

    pub fn with_thinking_budgets(mut self, budgets: ThinkingBudgets) -> Self {
        self.thinking_budgets = budgets;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_permission(mut self, handler: Arc<dyn PermissionHandler>) -> Self {
        self.permission = handler;
        self
    }

    pub fn with_api_key_fn(mut self, lookup: ApiKeyFn) -> Self {
        self.api_key = Some(lookup);
        self
    }

    /// Resolve API keys through a [`KeyStore`].
    pub fn with_key_store(mut self, store: Arc<KeyStore>) -> Self {
        self.api_key = Some(Arc::new(move |provider: &str| store.api_key(provider)));
        self
    }

    pub fn with_transform_context(mut self, transform: TransformContextFn) -> Self {
        self.transform_context = Some(transform);
        self
    }

    // -- host-facing handles ------------------------------------------------

    /// Subscribe to the event bus. Call before `run`; only one subscriber
    /// is supported.
    pub fn subscribe(&mut self) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(256);
        self.events = Some(tx);
        rx
    }

    /// The steering queue handle (mid-turn injection).
    pub fn steering_queue(&self) -> MessageQueue {
        self.steering.clone()
    }

    /// The follow-up queue handle (post-turn injection).
    pub fn follow_up_queue(&self) -> MessageQueue {
        self.follow_up.clone()
    }

    /// Token the host cancels to abort the run. One-shot.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install a fresh cancellation token after an aborted run.
    pub fn reset_cancellation(&mut self) {
        self.cancel = CancellationToken::new();
    }

    /// The transcript accumulated so far.
    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    /// Replace the transcript (e.g. restored from a session).
    pub fn load_messages(&mut self, messages: Vec<AgentMessage>) {
        self.messages = messages;
    }

    /// The configured model.
    pub fn model(&self) -> &LlmModel {
        &self.model
    }

    /// Switch models between runs.
    pub fn set_model(&mut self, model: LlmModel) {
        self.model = model;
    }

    /// Error details on the most recent assistant message, if any. Hosts
    /// inspect this to decide whether `run` may be retried.
    pub fn last_error(&self) -> Option<&AssistantError> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.as_message())
            .and_then(Message::error)
    }

    // -- driving ------------------------------------------------------------

    /// Append a user prompt and run the loop.
    pub async fn prompt(&mut self, content: impl Into<UserContent>) -> Result<()> {
        self.messages.push(Message::user(content).into());
        self.run().await
    }

    /// Re-enter the loop with no new prompt (retry after a retryable
    /// error, or resume after follow-ups were queued).
    pub async fn run(&mut self) -> Result<()> {
        self.emit(AgentEvent::AgentStart).await;

        let mut turn: u32 = 0;
        'outer: loop {
            // Inner loop: one provider stream plus its tool executions per
            // iteration.
            loop {
                if self.cancel.is_cancelled() {
                    break 'outer;
                }

                turn += 1;
                if turn > self.config.max_turns {
                    warn!(max_turns = self.config.max_turns, "turn limit exceeded");
                    let message = self.synthetic_error_message(
                        ErrorKind::Api,
                        format!("exceeded {} turns", self.config.max_turns),
                    );
                    self.messages.push(message.clone().into());
                    self.emit(AgentEvent::MessageEnd { message }).await;
                    break 'outer;
                }
                self.emit(AgentEvent::TurnStart { turn }).await;
                debug!(turn, "turn start");

                let assistant = self.stream_once().await;
                self.messages.push(assistant.clone().into());
                self.emit(AgentEvent::MessageEnd {
                    message: assistant.clone(),
                })
                .await;

                if assistant.error().is_some() {
                    // Provider failures exit the inner loop; pending
                    // follow-ups still get their turn, and the host may
                    // inspect the classification and call `run` again.
                    break;
                }

                let calls: Vec<ToolCallBlock> =
                    assistant.tool_calls().into_iter().cloned().collect();
                if calls.is_empty() {
                    break;
                }

                self.execute_tool_calls(&calls).await;
                if self.cancel.is_cancelled() {
                    break 'outer;
                }
            }

            // Clean inner exit: consult follow-ups.
            let follow_ups = match self.config.follow_up_mode {
                FollowUpMode::All => self.follow_up.drain_all(),
                FollowUpMode::OneAtATime => self.follow_up.pop().into_iter().collect(),
            };
            if follow_ups.is_empty() {
                break;
            }
            info!(count = follow_ups.len(), "re-entering loop with follow-ups");
            self.messages.extend(follow_ups);
        }

        self.emit(AgentEvent::AgentEnd {
            messages: self.messages.clone(),
        })
        .await;
        Ok(())
    }

    // -- one provider stream ------------------------------------------------

    /// Stream one assistant response, forwarding events, and return the
    /// final message. Failures come back as an assistant message with the
    /// error recorded; this function does not fail.
    async fn stream_once(&self) -> Message {
        let provider = match self.registry.get(self.model.api) {
            Ok(provider) => provider,
            Err(err) => {
                let message = self.synthetic_error_message(err.kind, err.message.clone());
                self.emit(AgentEvent::MessageUpdate {
                    event: AssistantMessageEvent::Error {
                        stop_reason: StopReason::Error,
                        error: err,
                        message: message.clone(),
                    },
                })
                .await;
                return message;
            }
        };

        let mut visible: Vec<Message> = self
            .messages
            .iter()
            .filter_map(AgentMessage::as_message)
            .cloned()
            .collect();
        if let Some(transform) = &self.transform_context {
            visible = transform(visible);
        }

        let context = Context {
            system_prompt: self.system_prompt.clone(),
            messages: visible,
            tools: self.tools.definitions(),
        };
        let options = StreamOptions {
            api_key: self
                .api_key
                .as_ref()
                .and_then(|lookup| lookup(&self.model.provider))
                .unwrap_or_default(),
            thinking_level: self.thinking_level,
            thinking_budgets: self.thinking_budgets,
            temperature: self.temperature,
            max_tokens: None,
            cancel: self.cancel.child_token(),
        };

        let mut stream = provider.stream(&self.model, &context, &options).await;
        if let Some(throttle) = self.config.throttle {
            stream = coalesce(stream, throttle);
        }

        while let Some(event) = stream.next().await {
            self.emit(AgentEvent::MessageUpdate {
                event: event.clone(),
            })
            .await;
            match event {
                AssistantMessageEvent::Done { message, .. } => return message,
                AssistantMessageEvent::Error { message, .. } => return message,
                _ => {}
            }
        }

        // The channel closed without a terminal event (provider task died).
        self.synthetic_error_message(
            ErrorKind::Network,
            "stream closed without a terminal event".to_string(),
        )
    }

    // -- tool execution -----------------------------------------------------

    /// Execute a turn's tool calls sequentially in model order. Between
    /// calls, steering messages short-circuit the remaining calls with
    /// placeholder results.
    async fn execute_tool_calls(&mut self, calls: &[ToolCallBlock]) {
        for (position, call) in calls.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return;
            }

            if position > 0 {
                let steering = self.steering.drain_all();
                if !steering.is_empty() {
                    info!(
                        skipped = calls.len() - position,
                        "steering received, short-circuiting remaining tool calls"
                    );
                    for skipped in &calls[position..] {
                        let message = Message::tool_result(
                            skipped.id.clone(),
                            skipped.name.clone(),
                            vec![ContentPart::text(STEERING_SKIP_TEXT)],
                            false,
                        );
                        self.messages.push(message.clone().into());
                        self.emit(AgentEvent::MessageEnd { message }).await;
                    }
                    self.messages.extend(steering);
                    return;
                }
            }

            let message = self.execute_one(call).await;
            self.messages.push(message.clone().into());
            self.emit(AgentEvent::MessageEnd { message }).await;
        }

        // Steering that arrived during the last call still lands before
        // the next turn's context build.
        let late = self.steering.drain_all();
        self.messages.extend(late);
    }

    /// Resolve, validate, permission-check, and run one tool call,
    /// producing its tool-result message. Failures never abort the loop.
    async fn execute_one(&self, call: &ToolCallBlock) -> Message {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "unknown tool requested");
            return Message::tool_result(
                call.id.clone(),
                call.name.clone(),
                vec![ContentPart::text(format!(
                    "Error: unknown tool `{}`",
                    call.name
                ))],
                true,
            );
        };

        let errors = validate_arguments(&call.arguments, &tool.parameters());
        if !errors.is_empty() {
            return Message::tool_result(
                call.id.clone(),
                call.name.clone(),
                vec![ContentPart::text(format!(
                    "Error: Argument validation failed:\n{}",
                    errors.join("\n")
                ))],
                true,
            );
        }

        self.emit(AgentEvent::ToolExecutionStart {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
        })
        .await;

        let decision = self.permission.check(&call.name, &call.arguments).await;
        let decision = match decision {
            PermissionDecision::NeedsConfirmation { reason } => {
                if self
                    .permission
                    .confirm(&call.name, &call.arguments, &reason)
                    .await
                {
                    PermissionDecision::Allow
                } else {
                    PermissionDecision::Deny { reason }
                }
            }
            other => other,
        };

        let message = match decision {
            PermissionDecision::Deny { reason } => {
                warn!(tool = %call.name, %reason, "tool execution denied");
                Message::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    vec![ContentPart::text(format!(
                        "Error: tool `{}` denied: {reason}",
                        call.name
                    ))],
                    true,
                )
            }
            _ => {
                let on_update: Option<ToolUpdateFn> = self.events.as_ref().map(|tx| {
                    let tx = tx.clone();
                    let call_id = call.id.clone();
                    let tool_name = call.name.clone();
                    Arc::new(move |output: ToolOutput| {
                        let _ = tx.try_send(AgentEvent::ToolExecutionUpdate {
                            call_id: call_id.clone(),
                            tool_name: tool_name.clone(),
                            output,
                        });
                    }) as ToolUpdateFn
                });

                let outcome = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    result = tool.execute(&call.id, &call.arguments, on_update) => Some(result),
                };

                match outcome {
                    Some(Ok(output)) => Message::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        output.content,
                        output.is_error,
                    ),
                    Some(Err(err)) => {
                        warn!(tool = %call.name, error = %err, "tool execution failed");
                        Message::tool_result(
                            call.id.clone(),
                            call.name.clone(),
                            vec![ContentPart::text(format!("Error: {err}"))],
                            true,
                        )
                    }
                    None => Message::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        vec![ContentPart::text("Error: tool execution aborted")],
                        true,
                    ),
                }
            }
        };

        self.emit(AgentEvent::ToolExecutionEnd {
            call_id: call.id.clone(),
            message: message.clone(),
        })
        .await;
        message
    }

    // -- helpers ------------------------------------------------------------

    fn synthetic_error_message(&self, kind: ErrorKind, message: String) -> Message {
        Message::Assistant {
            id: Uuid::now_v7().to_string(),
            content: Vec::new(),
            api: self.model.api,
            provider: self.model.provider.clone(),
            model: self.model.id.clone(),
            usage: None,
            stop_reason: Some(StopReason::Error),
            error: Some(AssistantError { kind, message }),
            timestamp: Utc::now(),
        }
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_protocol::{Api, CustomRecord, ModelCost};

    fn model() -> LlmModel {
        LlmModel {
            id: "test".into(),
            name: "Test".into(),
            api: Api::OpenAiChat,
            provider: "openai".into(),
            base_url: None,
            reasoning: false,
            modalities: Vec::new(),
            cost: ModelCost::default(),
            context_window: 100_000,
            max_tokens: 4096,
            headers: None,
        }
    }

    #[test]
    fn message_queue_is_fifo() {
        let queue = MessageQueue::default();
        queue.push(Message::user("a"));
        queue.push(Message::user("b"));
        let drained = queue.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].as_message().unwrap().text(), "a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn no_provider_registered_produces_error_message() {
        let registry = Arc::new(ProviderRegistry::new());
        let mut agent = Agent::new(registry, model());
        agent.prompt("hello").await.unwrap();

        let err = agent.last_error().unwrap();
        assert_eq!(err.kind, ErrorKind::NoProvider);
    }

    #[test]
    fn custom_records_are_invisible_to_the_llm() {
        let registry = Arc::new(ProviderRegistry::new());
        let mut agent = Agent::new(registry, model());
        agent.load_messages(vec![
            Message::user("hi").into(),
            AgentMessage::Custom(CustomRecord {
                custom_type: "bookmark".into(),
                data: json!({}),
            }),
        ]);

        let visible: Vec<Message> = agent
            .messages()
            .iter()
            .filter_map(AgentMessage::as_message)
            .cloned()
            .collect();
        assert_eq!(visible.len(), 1);
    }
}
