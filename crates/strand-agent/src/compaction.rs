//! Context compaction.
//!
//! When a branch's estimated token count approaches the model's context
//! window, a prefix of the branch is summarised into a single synthetic
//! message. The cut point is chosen so that roughly `keep_recent_tokens`
//! of recent conversation survive verbatim, adjusted to a user/assistant
//! boundary so a tool result is never orphaned from its call. The summary
//! is produced by the same provider pathway the main loop uses and
//! committed to the session as a `Compaction` entry.

use tracing::{debug, info};

use strand_protocol::{AgentMessage, LlmModel, Message, Usage};
use strand_provider::{Context, ProviderRegistry, StreamOptions};
use strand_session::{CompactionData, ContextItem, EntryKind, SessionStore};

use crate::error::{AgentError, Result};

/// Compaction configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompactionConfig {
    /// Headroom kept free below the context window.
    pub reserve_tokens: u64,
    /// Target amount of recent conversation to keep verbatim.
    pub keep_recent_tokens: u64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            reserve_tokens: 16_384,
            keep_recent_tokens: 20_000,
        }
    }
}

/// Boundary-exact trigger: compact when `ctx_tokens > window - reserve`.
pub fn should_compact(ctx_tokens: u64, context_window: u64, reserve: u64) -> bool {
    ctx_tokens > context_window.saturating_sub(reserve)
}

/// Crude token estimate for one transcript item: serialized length / 4.
pub fn estimate_message_tokens(message: &AgentMessage) -> u64 {
    let chars = serde_json::to_string(message)
        .map(|s| s.len())
        .unwrap_or(0);
    (chars as u64).div_ceil(4)
}

/// Estimated token count for a whole context.
pub fn estimate_context_tokens(items: &[ContextItem]) -> u64 {
    items
        .iter()
        .map(|item| estimate_message_tokens(&item.message))
        .sum()
}

/// The context size used for the trigger: the latest provider-reported
/// usage when available, else the character-count heuristic.
pub fn context_tokens(items: &[ContextItem], last_usage: Option<&Usage>) -> u64 {
    match last_usage {
        Some(usage) if usage.total > 0 => usage.total,
        Some(usage) if usage.input + usage.output > 0 => usage.input + usage.output,
        _ => estimate_context_tokens(items),
    }
}

/// Pick the first kept index for compaction.
///
/// Walk items newest to oldest, summing estimated tokens until the running
/// total reaches `keep_recent_tokens`; from that index, scan forward up to
/// 5 items for the first user or assistant message (never a tool result,
/// which would orphan its parent call). A cut at index 0 means there is
/// nothing to drop.
pub fn select_cut_index(items: &[ContextItem], keep_recent_tokens: u64) -> Result<usize> {
    let mut total = 0u64;
    let mut cut = 0usize;
    for (index, item) in items.iter().enumerate().rev() {
        total += estimate_message_tokens(&item.message);
        if total >= keep_recent_tokens {
            cut = index;
            break;
        }
    }

    if cut > 0 {
        let adjusted = (cut..items.len().min(cut + 5))
            .find(|&i| is_boundary(&items[i].message))
            .unwrap_or(cut);
        cut = adjusted;
    }

    if cut == 0 {
        return Err(AgentError::CannotCompact {
            reason: "branch is too short to compact".into(),
        });
    }
    Ok(cut)
}

fn is_boundary(message: &AgentMessage) -> bool {
    matches!(
        message.as_message(),
        Some(Message::User { .. }) | Some(Message::Assistant { .. })
    )
}

/// Summarise the live branch's prefix and commit a `Compaction` entry.
///
/// On success the session's reconstructed context becomes the synthetic
/// summary message followed by the kept tail. A failed summarisation
/// leaves the session untouched.
pub async fn compact_session(
    session: &SessionStore,
    registry: &ProviderRegistry,
    model: &LlmModel,
    options: &StreamOptions,
    config: &CompactionConfig,
) -> Result<CompactionData> {
    let context = session.context()?;
    let tokens_before = estimate_context_tokens(&context.items);
    let cut = select_cut_index(&context.items, config.keep_recent_tokens)?;

    info!(
        cut,
        total = context.items.len(),
        tokens_before,
        "compacting session branch"
    );

    let existing_summary = session.latest_compaction_summary();
    let summary = summarize(
        registry,
        model,
        options,
        &context.items[..cut],
        existing_summary,
    )
    .await?;

    let data = CompactionData {
        summary,
        first_kept_entry_id: context.items[cut].entry_id,
        tokens_before,
    };
    session.append(EntryKind::Compaction(data.clone()))?;
    Ok(data)
}

/// Run the summarisation request through the provider pathway and return
/// the assistant text.
async fn summarize(
    registry: &ProviderRegistry,
    model: &LlmModel,
    options: &StreamOptions,
    items: &[ContextItem],
    existing_summary: Option<String>,
) -> Result<String> {
    let prompt = checkpoint_prompt(items, existing_summary);
    let provider = registry.get(model.api)?;
    let context = Context {
        system_prompt: None,
        messages: vec![Message::user(prompt)],
        tools: Vec::new(),
    };

    debug!(model = %model.id, "requesting compaction summary");
    let mut stream = provider.stream(model, &context, options).await;
    while let Some(event) = stream.next().await {
        match event {
            strand_protocol::AssistantMessageEvent::Done { message, .. } => {
                return Ok(message.text());
            }
            strand_protocol::AssistantMessageEvent::Error { error, .. } => {
                return Err(AgentError::Provider(error));
            }
            _ => {}
        }
    }
    Err(AgentError::Internal(
        "summarisation stream closed without a terminal event".into(),
    ))
}

/// Build the structured checkpoint prompt.
fn checkpoint_prompt(items: &[ContextItem], existing_summary: Option<String>) -> String {
    let mut prompt = String::with_capacity(items.len() * 200 + 512);
    prompt.push_str(
        "Write a checkpoint summary of the conversation below so it can be \
         continued later. Use exactly these sections: Goal, Progress, \
         Current State, Key Decisions, Next Steps, Files Modified. Be \
         factual and concise.\n\n",
    );

    if let Some(existing) = existing_summary {
        prompt.push_str("An earlier checkpoint already exists; fold it into the new one:\n");
        prompt.push_str(&existing);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Conversation:\n");
    for item in items {
        if let Some(message) = item.message.as_message() {
            let role = match message {
                Message::User { .. } => "User",
                Message::Assistant { .. } => "Assistant",
                Message::ToolResult { .. } => "Tool",
            };
            prompt.push_str(role);
            prompt.push_str(": ");
            prompt.push_str(&message.text());
            for call in message.tool_calls() {
                prompt.push_str(&format!("\n  [tool call: {}]", call.name));
            }
            prompt.push('\n');
        }
    }
    prompt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
