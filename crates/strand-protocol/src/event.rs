//! The canonical streaming event set.
//!
//! Every provider adapter decodes its own SSE taxonomy into this sequence.
//! Invariants the adapters enforce:
//!
//! - Block indices are monotone non-decreasing; a block is started before
//!   any deltas reference it.
//! - Every started block gets exactly one matching end event unless the
//!   stream terminates in [`AssistantMessageEvent::Error`].
//! - Exactly one of `Done` or `Error` is emitted, and it is the last event.

use crate::error::ProviderError;
use crate::message::{Message, ToolCallBlock};
use crate::model::StopReason;

/// One event in an assistant message stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantMessageEvent {
    /// The stream has started; carries the partial (empty) message shell.
    Start { message: Message },

    /// A text block opened at `index`.
    TextStart { index: usize },
    /// A chunk of text for the block at `index`.
    TextDelta { index: usize, delta: String },
    /// The text block at `index` closed; carries the final text.
    TextEnd { index: usize, text: String },

    /// A thinking block opened at `index`.
    ThinkingStart { index: usize },
    /// A chunk of reasoning for the block at `index`.
    ThinkingDelta { index: usize, delta: String },
    /// The thinking block at `index` closed; carries the final text.
    ThinkingEnd { index: usize, thinking: String },

    /// A tool-call block opened at `index`.
    ToolCallStart {
        index: usize,
        id: String,
        name: String,
    },
    /// A raw JSON fragment of the call's arguments.
    ToolCallDelta { index: usize, delta: String },
    /// The tool-call block at `index` closed; arguments are parsed exactly
    /// once at this point (parse failure yields an empty argument map).
    ToolCallEnd { index: usize, call: ToolCallBlock },

    /// Terminal: the stream completed; carries the final message.
    Done {
        stop_reason: StopReason,
        message: Message,
    },
    /// Terminal: the stream failed; carries the partial message accumulated
    /// so far.
    Error {
        stop_reason: StopReason,
        error: ProviderError,
        message: Message,
    },
}

impl AssistantMessageEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Whether this is a coalescable content delta (text or thinking).
    /// Block-boundary and terminal events must never be coalesced.
    pub fn is_content_delta(&self) -> bool {
        matches!(self, Self::TextDelta { .. } | Self::ThinkingDelta { .. })
    }
}
