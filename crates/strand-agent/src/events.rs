//! The agent event bus.
//!
//! The loop emits these over an mpsc channel the host subscribes to; the
//! host renders off the bus rather than observing loop state directly.
//! Streaming deltas may be coalesced upstream (see
//! [`strand_provider::throttle`]), but lifecycle and block-boundary events
//! are never dropped.

use strand_protocol::{AgentMessage, AssistantMessageEvent, Message};

use crate::tool::ToolOutput;

/// One event in an agent run.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The run started.
    AgentStart,

    /// A new inner-loop turn began.
    TurnStart { turn: u32 },

    /// A streaming event from the active provider stream, forwarded in
    /// order.
    MessageUpdate { event: AssistantMessageEvent },

    /// A message reached its final form and was appended to the
    /// transcript (assistant messages and tool results alike).
    MessageEnd { message: Message },

    /// A tool is about to be permission-checked and executed.
    ToolExecutionStart { call_id: String, tool_name: String },

    /// Partial output pushed by a long-running tool.
    ToolExecutionUpdate {
        call_id: String,
        tool_name: String,
        output: ToolOutput,
    },

    /// A tool finished; carries the tool-result message that was appended.
    ToolExecutionEnd { call_id: String, message: Message },

    /// The run finished (normally, by error, turn limit, or cancellation);
    /// carries the full transcript including any partial results.
    AgentEnd { messages: Vec<AgentMessage> },
}
