//! Session entry types and their on-disk encoding.
//!
//! One entry per line, JSON-encoded, discriminated by `entryType`. Unknown
//! entry types must survive a read/re-write cycle byte-for-byte in content,
//! so the store keeps them as raw JSON values ([`StoredEntry::Unknown`])
//! rather than rejecting the line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use strand_protocol::{AgentMessage, Api, ThinkingLevel};

// ---------------------------------------------------------------------------
// Entry payloads
// ---------------------------------------------------------------------------

/// The first entry of every session file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Schema version; readers reject files below [`crate::SESSION_VERSION`].
    pub version: u32,
    /// Stable session identifier.
    pub session_id: Uuid,
    /// Working directory the session was started in.
    pub cwd: String,
    /// The session this one was forked from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session: Option<Uuid>,
}

/// Payload of a compaction entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionData {
    /// The model-produced summary of the compacted prefix.
    pub summary: String,
    /// Id of the first entry that survives the compaction.
    pub first_kept_entry_id: Uuid,
    /// Estimated context size before compaction.
    pub tokens_before: u64,
}

/// The typed payload of a session entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entryType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EntryKind {
    /// File header; always the first line.
    Header(Header),
    /// A transcript message.
    Message { message: AgentMessage },
    /// The thinking level changed from this point on the branch.
    ThinkingLevelChange { level: ThinkingLevel },
    /// The model changed from this point on the branch.
    ModelChange {
        api: Api,
        provider: String,
        model_id: String,
    },
    /// A prefix of the branch was summarised away.
    Compaction(CompactionData),
    /// Summary injected when a branch was abandoned and resumed elsewhere.
    BranchSummary { summary: String },
    /// Host-assigned label for this point in the tree.
    Label { label: String },
    /// Session metadata (display name etc.).
    SessionInfo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Opaque host data.
    Custom { data: Value },
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One line of a session file. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// Parent entry id; `None` only for the header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Typed payload, discriminated by `entryType`.
    #[serde(flatten)]
    pub kind: EntryKind,
    /// Append time.
    pub timestamp: DateTime<Utc>,
}

/// An entry as held in memory: either fully parsed or an unknown entry type
/// preserved verbatim for re-writes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEntry {
    /// A recognised entry.
    Parsed(SessionEntry),
    /// An entry whose `entryType` we do not understand. Participates in the
    /// tree (its id and parent are honoured) but is skipped during context
    /// reconstruction.
    Unknown(Value),
}

impl StoredEntry {
    /// The entry id, when one can be read.
    pub fn id(&self) -> Option<Uuid> {
        match self {
            Self::Parsed(e) => Some(e.id),
            Self::Unknown(v) => v["id"].as_str().and_then(|s| s.parse().ok()),
        }
    }

    /// The parent id, when one can be read.
    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            Self::Parsed(e) => e.parent_id,
            Self::Unknown(v) => v["parentId"].as_str().and_then(|s| s.parse().ok()),
        }
    }

    /// The parsed entry, if this is not an unknown type.
    pub fn as_parsed(&self) -> Option<&SessionEntry> {
        match self {
            Self::Parsed(e) => Some(e),
            Self::Unknown(_) => None,
        }
    }

    /// Decode one line of a session file.
    ///
    /// A line that parses as JSON but carries an unrecognised `entryType`
    /// becomes [`StoredEntry::Unknown`]. A line that is not valid JSON at
    /// all yields `None` (the reader skips it; this covers torn trailing
    /// writes).
    pub fn decode_line(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        match serde_json::from_value::<SessionEntry>(value.clone()) {
            Ok(entry) => Some(Self::Parsed(entry)),
            Err(_) => {
                if value.get("entryType").is_some() && value.get("id").is_some() {
                    Some(Self::Unknown(value))
                } else {
                    None
                }
            }
        }
    }

    /// Encode this entry as one JSON line (no trailing newline).
    pub fn encode_line(&self) -> serde_json::Result<String> {
        match self {
            Self::Parsed(e) => serde_json::to_string(e),
            Self::Unknown(v) => serde_json::to_string(v),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use strand_protocol::Message;

    fn entry(kind: EntryKind, parent: Option<Uuid>) -> SessionEntry {
        SessionEntry {
            id: Uuid::now_v7(),
            parent_id: parent,
            kind,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn every_entry_kind_round_trips() {
        let header = Header {
            version: 3,
            session_id: Uuid::now_v7(),
            cwd: "/tmp/project".into(),
            parent_session: None,
        };
        let kinds = vec![
            EntryKind::Header(header),
            EntryKind::Message {
                message: Message::user("hello").into(),
            },
            EntryKind::ThinkingLevelChange {
                level: ThinkingLevel::High,
            },
            EntryKind::ModelChange {
                api: Api::OpenAiChat,
                provider: "openai".into(),
                model_id: "gpt-4o".into(),
            },
            EntryKind::Compaction(CompactionData {
                summary: "did things".into(),
                first_kept_entry_id: Uuid::now_v7(),
                tokens_before: 24_000,
            }),
            EntryKind::BranchSummary {
                summary: "tried X".into(),
            },
            EntryKind::Label {
                label: "checkpoint".into(),
            },
            EntryKind::SessionInfo {
                name: Some("my session".into()),
            },
            EntryKind::Custom {
                data: serde_json::json!({"k": 1}),
            },
        ];

        let parent = Some(Uuid::now_v7());
        for kind in kinds {
            let e = entry(kind, parent);
            let line = serde_json::to_string(&e).unwrap();
            let back: SessionEntry = serde_json::from_str(&line).unwrap();
            assert_eq!(back, e);
        }
    }

    #[test]
    fn entry_type_discriminator_is_camel_case() {
        let e = entry(
            EntryKind::ThinkingLevelChange {
                level: ThinkingLevel::Low,
            },
            None,
        );
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["entryType"], "thinkingLevelChange");
    }

    #[test]
    fn unknown_entry_type_is_preserved_verbatim() {
        let line = r#"{"id":"018f63e0-0000-7000-8000-000000000001","parentId":"018f63e0-0000-7000-8000-000000000000","entryType":"futureThing","payload":{"x":1},"timestamp":"2025-01-01T00:00:00Z"}"#;
        let stored = StoredEntry::decode_line(line).unwrap();
        assert!(matches!(stored, StoredEntry::Unknown(_)));
        assert!(stored.id().is_some());
        assert!(stored.parent_id().is_some());

        let encoded = stored.encode_line().unwrap();
        let a: Value = serde_json::from_str(line).unwrap();
        let b: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn torn_line_is_skipped() {
        assert!(StoredEntry::decode_line(r#"{"id":"018f63e0-00"#).is_none());
        assert!(StoredEntry::decode_line("").is_none());
    }
}
