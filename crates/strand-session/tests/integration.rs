//! Session store integration tests: file round-trips, branching, and
//! context reconstruction against real files.

use strand_protocol::{Message, ThinkingLevel};
use strand_session::{EntryKind, SessionStore, StoredEntry};

fn message(text: &str) -> EntryKind {
    EntryKind::Message {
        message: Message::user(text).into(),
    }
}

#[test]
fn branching_selects_the_new_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let session = SessionStore::create(dir.path().join("s.jsonl"), "/work", None).unwrap();

    let m1 = session.append(message("M1")).unwrap();
    let _m2 = session.append(message("M2")).unwrap();

    session.branch(m1).unwrap();
    let _m2_prime = session.append(message("M2-prime")).unwrap();

    let ctx = session.context().unwrap();
    let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
    assert_eq!(texts, vec!["M1", "M2-prime"]);
}

#[test]
fn branches_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.jsonl");
    {
        let session = SessionStore::create(&path, "/work", None).unwrap();
        let m1 = session.append(message("M1")).unwrap();
        session.append(message("M2")).unwrap();
        session.branch(m1).unwrap();
        session.append(message("M2-prime")).unwrap();
    }

    // The leaf after reopen is the most recently appended entry, which is
    // on the new branch.
    let session = SessionStore::open(&path).unwrap();
    let ctx = session.context().unwrap();
    let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
    assert_eq!(texts, vec!["M1", "M2-prime"]);

    // The abandoned branch is still in the tree, never pruned.
    assert_eq!(session.entries().len(), 4);
}

#[test]
fn every_entry_line_decodes_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.jsonl");
    let session = SessionStore::create(&path, "/work", None).unwrap();
    session.append(message("hello")).unwrap();
    session
        .append(EntryKind::ThinkingLevelChange {
            level: ThinkingLevel::High,
        })
        .unwrap();
    session
        .append(EntryKind::Label {
            label: "checkpoint".into(),
        })
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    for line in content.lines() {
        let entry = StoredEntry::decode_line(line).expect("line should decode");
        assert!(matches!(entry, StoredEntry::Parsed(_)));
        // decode(encode(entry)) == entry
        let encoded = entry.encode_line().unwrap();
        assert_eq!(StoredEntry::decode_line(&encoded).unwrap(), entry);
    }
}

#[test]
fn unknown_entry_types_survive_reopen_and_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.jsonl");
    let last;
    {
        let session = SessionStore::create(&path, "/work", None).unwrap();
        session.append(message("visible")).unwrap();
        last = session.leaf();
    }

    // Simulate a newer writer appending an entry type we do not know,
    // chained onto the current leaf.
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        let line = format!(
            r#"{{"id":"{}","parentId":"{last}","entryType":"futureThing","payload":{{"x":1}},"timestamp":"2025-06-01T00:00:00Z"}}"#,
            uuid::Uuid::now_v7(),
        );
        writeln!(file, "{line}").unwrap();
    }

    let session = SessionStore::open(&path).unwrap();
    // The unknown entry is the leaf and participates in the tree...
    let entries = session.entries();
    assert!(matches!(entries.last().unwrap(), StoredEntry::Unknown(_)));

    // ...but reconstruction skips it.
    let ctx = session.context().unwrap();
    let texts: Vec<String> = ctx.messages().iter().map(Message::text).collect();
    assert_eq!(texts, vec!["visible"]);

    // Re-encoding preserves it verbatim.
    let encoded = entries.last().unwrap().encode_line().unwrap();
    let v: serde_json::Value = serde_json::from_str(&encoded).unwrap();
    assert_eq!(v["entryType"], "futureThing");
    assert_eq!(v["payload"]["x"], 1);
}

#[test]
fn thinking_and_model_changes_apply_to_the_branch_only() {
    let dir = tempfile::tempdir().unwrap();
    let session = SessionStore::create(dir.path().join("s.jsonl"), "/work", None).unwrap();

    let base = session.append(message("base")).unwrap();
    session
        .append(EntryKind::ThinkingLevelChange {
            level: ThinkingLevel::XHigh,
        })
        .unwrap();

    // Branch from before the change: the level does not apply there.
    session.branch(base).unwrap();
    session.append(message("other path")).unwrap();
    let ctx = session.context().unwrap();
    assert_eq!(ctx.thinking_level, None);
}
