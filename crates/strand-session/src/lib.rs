//! Branched append-only session store.
//!
//! Each session is a single newline-delimited JSON file. The first line is
//! always a [`entry::EntryKind::Header`]; every subsequent line is a
//! [`entry::SessionEntry`] whose `parentId` refers to an earlier entry in
//! the same file, forming a tree rooted at the header. A mutable *leaf*
//! pointer selects the live branch; [`store::SessionStore::branch`]
//! reassigns it without writing anything, so the tree is never pruned.
//!
//! Context for the LLM is reconstructed by walking leaf-to-root and folding
//! the path root-to-leaf ([`context::reconstruct`]). Compaction entries
//! replace everything collected so far with a single synthetic summary
//! message, preserving the branch tail.

pub mod context;
pub mod entry;
pub mod error;
pub mod store;

pub use context::{reconstruct, ContextItem, SessionContext};
pub use entry::{CompactionData, EntryKind, Header, SessionEntry, StoredEntry};
pub use error::{Result, SessionError};
pub use store::SessionStore;

/// Current session file schema version.
pub const SESSION_VERSION: u32 = 3;
