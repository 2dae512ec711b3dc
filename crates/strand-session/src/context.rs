//! Context reconstruction: turn a branch of the session tree back into the
//! message list a provider will see.

use std::collections::HashMap;

use uuid::Uuid;

use strand_protocol::{AgentMessage, Api, Message, ThinkingLevel};

use crate::entry::{EntryKind, SessionEntry, StoredEntry};
use crate::error::{Result, SessionError};

/// One reconstructed transcript item, tagged with the session entry that
/// produced it so later operations (compaction) can name cut points.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextItem {
    /// Id of the originating session entry.
    pub entry_id: Uuid,
    /// The transcript item.
    pub message: AgentMessage,
}

/// Running model selection picked up from `modelChange` entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub api: Api,
    pub provider: String,
    pub model_id: String,
}

/// The reconstructed state of a branch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionContext {
    /// Transcript items, oldest first.
    pub items: Vec<ContextItem>,
    /// Thinking level in effect at the leaf, if any change was recorded.
    pub thinking_level: Option<ThinkingLevel>,
    /// Model in effect at the leaf, if any change was recorded.
    pub model: Option<ModelSelection>,
}

impl SessionContext {
    /// The LLM-visible messages: custom records filtered out.
    pub fn messages(&self) -> Vec<Message> {
        self.items
            .iter()
            .filter_map(|item| item.message.as_message().cloned())
            .collect()
    }
}

/// Walk from `leaf` to the root, then fold the path root-to-leaf.
///
/// Folding rules: headers, labels, session info, custom entries, and
/// unknown entry types are ignored; messages append; thinking-level and
/// model changes update the running cursors; a compaction entry clears
/// everything collected so far and injects a synthetic user message carrying
/// the summary; a branch summary injects a synthetic user message without
/// clearing.
pub fn reconstruct(entries: &[StoredEntry], leaf: Uuid) -> Result<SessionContext> {
    let index: HashMap<Uuid, &StoredEntry> = entries
        .iter()
        .filter_map(|e| e.id().map(|id| (id, e)))
        .collect();

    // Leaf to root. Every parent_id must resolve within this session, and
    // the walk is bounded by the entry count so a (corrupt) cycle cannot
    // hang us.
    let mut path: Vec<&StoredEntry> = Vec::new();
    let mut cursor = Some(leaf);
    while let Some(id) = cursor {
        let entry = index
            .get(&id)
            .copied()
            .ok_or(SessionError::UnknownEntry { id })?;
        path.push(entry);
        if path.len() > entries.len() {
            return Err(SessionError::UnknownEntry { id });
        }
        cursor = entry.parent_id();
    }
    path.reverse();

    let mut ctx = SessionContext::default();
    for stored in path {
        let Some(entry) = stored.as_parsed() else {
            continue; // unknown entry types are skipped
        };
        fold(&mut ctx, entry);
    }
    Ok(ctx)
}

fn fold(ctx: &mut SessionContext, entry: &SessionEntry) {
    match &entry.kind {
        EntryKind::Header(_)
        | EntryKind::Label { .. }
        | EntryKind::SessionInfo { .. }
        | EntryKind::Custom { .. } => {}

        EntryKind::Message { message } => ctx.items.push(ContextItem {
            entry_id: entry.id,
            message: message.clone(),
        }),

        EntryKind::ThinkingLevelChange { level } => ctx.thinking_level = Some(*level),

        EntryKind::ModelChange {
            api,
            provider,
            model_id,
        } => {
            ctx.model = Some(ModelSelection {
                api: *api,
                provider: provider.clone(),
                model_id: model_id.clone(),
            })
        }

        EntryKind::Compaction(data) => {
            // Everything before the first kept entry is replaced by the
            // summary; the branch tail survives verbatim.
            let tail = ctx
                .items
                .iter()
                .position(|item| item.entry_id == data.first_kept_entry_id)
                .map(|pos| ctx.items.split_off(pos))
                .unwrap_or_default();
            ctx.items.clear();
            ctx.items.push(ContextItem {
                entry_id: entry.id,
                message: Message::user(format!(
                    "Previous conversation summary:\n{}",
                    data.summary
                ))
                .into(),
            });
            ctx.items.extend(tail);
        }

        EntryKind::BranchSummary { summary } => ctx.items.push(ContextItem {
            entry_id: entry.id,
            message: Message::user(format!("Branch summary:\n{summary}")).into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CompactionData, Header};
    use chrono::Utc;

    fn parsed(kind: EntryKind, id: Uuid, parent: Option<Uuid>) -> StoredEntry {
        StoredEntry::Parsed(SessionEntry {
            id,
            parent_id: parent,
            kind,
            timestamp: Utc::now(),
        })
    }

    fn header_entry(id: Uuid) -> StoredEntry {
        parsed(
            EntryKind::Header(Header {
                version: 3,
                session_id: Uuid::now_v7(),
                cwd: "/".into(),
                parent_session: None,
            }),
            id,
            None,
        )
    }

    fn message_entry(text: &str, id: Uuid, parent: Uuid) -> StoredEntry {
        parsed(
            EntryKind::Message {
                message: Message::user(text).into(),
            },
            id,
            Some(parent),
        )
    }

    #[test]
    fn folds_messages_in_order() {
        let (h, m1, m2) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let entries = vec![
            header_entry(h),
            message_entry("one", m1, h),
            message_entry("two", m2, m1),
        ];
        let ctx = reconstruct(&entries, m2).unwrap();
        let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn compaction_clears_and_injects_summary() {
        let (h, m1, c, m2) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let entries = vec![
            header_entry(h),
            message_entry("old stuff", m1, h),
            parsed(
                EntryKind::Compaction(CompactionData {
                    summary: "we did old stuff".into(),
                    first_kept_entry_id: m2,
                    tokens_before: 1000,
                }),
                c,
                Some(m1),
            ),
            message_entry("new stuff", m2, c),
        ];
        let ctx = reconstruct(&entries, m2).unwrap();
        let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
        assert_eq!(
            texts,
            vec![
                "Previous conversation summary:\nwe did old stuff",
                "new stuff"
            ]
        );
    }

    #[test]
    fn compaction_at_the_leaf_preserves_the_kept_tail() {
        // Messages first, compaction appended last, first_kept pointing
        // into the middle: the tail from there on survives.
        let ids: Vec<Uuid> = (0..6).map(|_| Uuid::now_v7()).collect();
        let (h, m1, m2, m3, m4, c) = (ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]);
        let entries = vec![
            header_entry(h),
            message_entry("one", m1, h),
            message_entry("two", m2, m1),
            message_entry("three", m3, m2),
            message_entry("four", m4, m3),
            parsed(
                EntryKind::Compaction(CompactionData {
                    summary: "one and two happened".into(),
                    first_kept_entry_id: m3,
                    tokens_before: 4000,
                }),
                c,
                Some(m4),
            ),
        ];
        let ctx = reconstruct(&entries, c).unwrap();
        let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
        assert_eq!(
            texts,
            vec![
                "Previous conversation summary:\none and two happened",
                "three",
                "four"
            ]
        );
    }

    #[test]
    fn cursors_track_latest_changes() {
        let (h, t1, t2, m) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let entries = vec![
            header_entry(h),
            parsed(
                EntryKind::ThinkingLevelChange {
                    level: ThinkingLevel::Low,
                },
                t1,
                Some(h),
            ),
            parsed(
                EntryKind::ThinkingLevelChange {
                    level: ThinkingLevel::High,
                },
                t2,
                Some(t1),
            ),
            parsed(
                EntryKind::ModelChange {
                    api: Api::AnthropicMessages,
                    provider: "anthropic".into(),
                    model_id: "claude-sonnet-4-20250514".into(),
                },
                m,
                Some(t2),
            ),
        ];
        let ctx = reconstruct(&entries, m).unwrap();
        assert_eq!(ctx.thinking_level, Some(ThinkingLevel::High));
        assert_eq!(ctx.model.unwrap().model_id, "claude-sonnet-4-20250514");
    }

    #[test]
    fn branch_selects_only_ancestors() {
        let (h, m1, m2, m2b) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let entries = vec![
            header_entry(h),
            message_entry("m1", m1, h),
            message_entry("m2", m2, m1),
            message_entry("m2-prime", m2b, m1),
        ];
        let ctx = reconstruct(&entries, m2b).unwrap();
        let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["m1", "m2-prime"]);
    }

    #[test]
    fn dangling_parent_is_an_error() {
        let m = Uuid::now_v7();
        let entries = vec![message_entry("x", m, Uuid::now_v7())];
        assert!(reconstruct(&entries, m).is_err());
    }
}
