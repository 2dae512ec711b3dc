//! Delta-coalescing stream adapter.
//!
//! Sits between a provider stream and the downstream event bus: text and
//! thinking deltas for the same block arriving within the window are merged
//! into one event. Content is never dropped, and block-boundary and
//! terminal events are forwarded immediately (flushing any pending delta
//! first), so ordering and the start/delta/end discipline are preserved.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use strand_protocol::AssistantMessageEvent;

use crate::provider::AssistantEventStream;

/// Coalescing window configuration.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// How long a pending delta may wait for more content.
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(100),
        }
    }
}

/// Wrap `inner` with a coalescing window. Cancelling the returned stream
/// cancels the underlying request.
pub fn coalesce(mut inner: AssistantEventStream, config: ThrottleConfig) -> AssistantEventStream {
    let (tx, rx) = mpsc::channel(256);
    let cancel = inner.cancel_token();

    tokio::spawn(async move {
        let mut pending: Option<AssistantMessageEvent> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                event = inner.next() => match event {
                    Some(event) if event.is_content_delta() => {
                        match merge(&mut pending, event) {
                            None => {
                                if deadline.is_none() {
                                    deadline = Some(Instant::now() + config.window);
                                }
                            }
                            Some(flushed) => {
                                if tx.send(flushed).await.is_err() {
                                    return;
                                }
                                deadline = Some(Instant::now() + config.window);
                            }
                        }
                    }
                    Some(event) => {
                        if let Some(p) = pending.take() {
                            deadline = None;
                            if tx.send(p).await.is_err() {
                                return;
                            }
                        }
                        let terminal = event.is_terminal();
                        if tx.send(event).await.is_err() || terminal {
                            return;
                        }
                    }
                    None => {
                        if let Some(p) = pending.take() {
                            let _ = tx.send(p).await;
                        }
                        return;
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    deadline = None;
                    if let Some(p) = pending.take() {
                        if tx.send(p).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    AssistantEventStream::new(rx, cancel)
}

/// Merge `event` into `pending` when both are deltas for the same block.
/// Returns the previous pending event when it could not absorb the new one.
fn merge(
    pending: &mut Option<AssistantMessageEvent>,
    event: AssistantMessageEvent,
) -> Option<AssistantMessageEvent> {
    match (pending.as_mut(), event) {
        (
            Some(AssistantMessageEvent::TextDelta { index: i, delta: d }),
            AssistantMessageEvent::TextDelta { index, delta },
        ) if *i == index => {
            d.push_str(&delta);
            None
        }
        (
            Some(AssistantMessageEvent::ThinkingDelta { index: i, delta: d }),
            AssistantMessageEvent::ThinkingDelta { index, delta },
        ) if *i == index => {
            d.push_str(&delta);
            None
        }
        (_, event) => pending.replace(event),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
