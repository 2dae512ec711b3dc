//! The append-only session file store.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::{reconstruct, SessionContext};
use crate::entry::{EntryKind, Header, SessionEntry, StoredEntry};
use crate::error::{Result, SessionError};
use crate::SESSION_VERSION;

#[derive(Debug)]
struct Inner {
    entries: Vec<StoredEntry>,
    /// Entry id -> position in `entries`.
    index: HashMap<Uuid, usize>,
    /// The live branch tip. Always a descendant of the header.
    leaf: Uuid,
}

/// A single session backed by one append-only JSONL file.
///
/// Writes are line-buffered and atomic at line granularity: each append
/// opens the file for append, writes one line including the trailing
/// newline, and flushes. All writes originate from the agent loop task;
/// the interior mutex exists for occasional host-side reads from other
/// threads.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    header: Header,
    header_id: Uuid,
    inner: Mutex<Inner>,
}

impl SessionStore {
    /// Create a fresh session file at `path`, writing the header line.
    pub fn create(
        path: impl Into<PathBuf>,
        cwd: impl Into<String>,
        parent_session: Option<Uuid>,
    ) -> Result<Self> {
        let path = path.into();
        let header = Header {
            version: SESSION_VERSION,
            session_id: Uuid::now_v7(),
            cwd: cwd.into(),
            parent_session,
        };
        let entry = SessionEntry {
            id: Uuid::now_v7(),
            parent_id: None,
            kind: EntryKind::Header(header.clone()),
            timestamp: Utc::now(),
        };

        let mut file = File::create(&path)?;
        let line = serde_json::to_string(&entry)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;

        debug!(session_id = %header.session_id, path = %path.display(), "session created");

        let header_id = entry.id;
        let mut index = HashMap::new();
        index.insert(header_id, 0);
        Ok(Self {
            path,
            header,
            header_id,
            inner: Mutex::new(Inner {
                entries: vec![StoredEntry::Parsed(entry)],
                index,
                leaf: header_id,
            }),
        })
    }

    /// Open an existing session file.
    ///
    /// Lines that do not parse (torn trailing writes) are skipped. The leaf
    /// is set to the most recently appended entry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let reader = BufReader::new(File::open(&path)?);

        let mut entries: Vec<StoredEntry> = Vec::new();
        let mut index = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match StoredEntry::decode_line(&line) {
                Some(entry) => {
                    if let Some(id) = entry.id() {
                        index.insert(id, entries.len());
                    }
                    entries.push(entry);
                }
                None => warn!(path = %path.display(), "skipping unparseable session line"),
            }
        }

        let first = entries.first().ok_or(SessionError::MissingHeader)?;
        let (header, header_id) = match first.as_parsed() {
            Some(SessionEntry {
                id,
                kind: EntryKind::Header(h),
                ..
            }) => (h.clone(), *id),
            _ => return Err(SessionError::MissingHeader),
        };
        if header.version < SESSION_VERSION {
            return Err(SessionError::UnsupportedVersion {
                found: header.version,
                minimum: SESSION_VERSION,
            });
        }

        let leaf = entries
            .iter()
            .rev()
            .find_map(StoredEntry::id)
            .unwrap_or(header_id);

        debug!(
            session_id = %header.session_id,
            entries = entries.len(),
            "session opened"
        );

        Ok(Self {
            path,
            header,
            header_id,
            inner: Mutex::new(Inner {
                entries,
                index,
                leaf,
            }),
        })
    }

    /// The session file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The session header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Id of the header entry (the tree root).
    pub fn header_id(&self) -> Uuid {
        self.header_id
    }

    /// The current leaf id.
    pub fn leaf(&self) -> Uuid {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).leaf
    }

    /// Snapshot of all entries (copy-on-observe).
    pub fn entries(&self) -> Vec<StoredEntry> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .clone()
    }

    /// Append an entry chained to the current leaf. Returns the new entry's
    /// id, which becomes the leaf.
    pub fn append(&self, kind: EntryKind) -> Result<Uuid> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = SessionEntry {
            id: Uuid::now_v7(),
            parent_id: Some(inner.leaf),
            kind,
            timestamp: Utc::now(),
        };

        let line = serde_json::to_string(&entry)?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;

        let id = entry.id;
        let pos = inner.entries.len();
        inner.entries.push(StoredEntry::Parsed(entry));
        inner.index.insert(id, pos);
        inner.leaf = id;
        Ok(id)
    }

    /// Reassign the leaf to an existing entry without writing anything.
    /// Subsequent appends chain from the new leaf, producing a new branch.
    pub fn branch(&self, to: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.index.contains_key(&to) {
            return Err(SessionError::UnknownEntry { id: to });
        }
        debug!(leaf = %to, "branched session");
        inner.leaf = to;
        Ok(())
    }

    /// Reconstruct the LLM-visible context for the live branch.
    pub fn context(&self) -> Result<SessionContext> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        reconstruct(&inner.entries, inner.leaf)
    }

    /// The summary of the most recent compaction on the live branch, if any.
    /// Used to fold prior checkpoints into the next compaction.
    pub fn latest_compaction_summary(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut cursor = Some(inner.leaf);
        while let Some(id) = cursor {
            let entry = inner.index.get(&id).map(|&i| &inner.entries[i])?;
            if let Some(SessionEntry {
                kind: EntryKind::Compaction(data),
                ..
            }) = entry.as_parsed()
            {
                return Some(data.summary.clone());
            }
            cursor = entry.parent_id();
        }
        None
    }
}
