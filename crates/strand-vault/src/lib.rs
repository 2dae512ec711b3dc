//! API-key records and lookup.
//!
//! Keys are persisted as a JSON array of [`ApiKeyRecord`]s. At most one
//! record per provider is selected. Lookup resolves, in order: the selected
//! record for the provider, any selected record for another provider (to
//! support OpenAI-compatible gateways), then well-known environment
//! variables.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variables consulted when no stored key matches, in order.
const ENV_FALLBACKS: &[(&str, &str)] = &[
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("azure", "AZURE_OPENAI_API_KEY"),
];

/// Key store error type.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// One stored API key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Provider this key belongs to (e.g. `"anthropic"`).
    pub provider: String,
    /// Display name for the record.
    pub name: String,
    /// The key material.
    pub api_key: String,
    /// Optional endpoint override (gateways).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Whether this is the active record for its provider. At most one
    /// record per provider is selected.
    #[serde(default)]
    pub is_selected: bool,
}

/// A JSON-array-backed key store.
pub struct KeyStore {
    path: PathBuf,
    records: Mutex<Vec<ApiKeyRecord>>,
}

impl KeyStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// An in-memory store (tests, hosts without persistence).
    pub fn in_memory(records: Vec<ApiKeyRecord>) -> Self {
        Self {
            path: PathBuf::new(),
            records: Mutex::new(records),
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<ApiKeyRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Add a record and persist. If the record is selected, any previously
    /// selected record for the same provider is deselected.
    pub fn insert(&self, record: ApiKeyRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if record.is_selected {
            for existing in records.iter_mut() {
                if existing.provider == record.provider {
                    existing.is_selected = false;
                }
            }
        }
        records.push(record);
        self.persist(&records)
    }

    /// Mark the record named `name` under `provider` as selected,
    /// deselecting its siblings, and persist.
    pub fn select(&self, provider: &str, name: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        for record in records.iter_mut() {
            if record.provider == provider {
                record.is_selected = record.name == name;
            }
        }
        self.persist(&records)
    }

    /// Resolve the API key for `provider`.
    ///
    /// Order: the selected record for `provider`; any selected record for
    /// another provider; the environment variables `ANTHROPIC_API_KEY`,
    /// `OPENAI_API_KEY`, `GOOGLE_API_KEY`, `AZURE_OPENAI_API_KEY` (the
    /// provider's own variable first).
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(record) = records
            .iter()
            .find(|r| r.is_selected && r.provider == provider)
        {
            return Some(record.api_key.clone());
        }

        if let Some(record) = records.iter().find(|r| r.is_selected) {
            debug!(
                provider,
                fallback = %record.provider,
                "using selected key from another provider"
            );
            return Some(record.api_key.clone());
        }

        drop(records);
        self.env_key(provider)
    }

    /// The stored base-URL override for `provider`'s selected record.
    pub fn base_url(&self, provider: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.is_selected && r.provider == provider)
            .and_then(|r| r.base_url.clone())
    }

    fn env_key(&self, provider: &str) -> Option<String> {
        // The provider's own variable wins; otherwise first hit in order.
        if let Some((_, var)) = ENV_FALLBACKS.iter().find(|(p, _)| *p == provider) {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }
        for (_, var) in ENV_FALLBACKS {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }
        None
    }

    fn persist(&self, records: &[ApiKeyRecord]) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let text = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(provider: &str, key: &str, selected: bool) -> ApiKeyRecord {
        ApiKeyRecord {
            provider: provider.into(),
            name: format!("{provider}-default"),
            api_key: key.into(),
            base_url: None,
            is_selected: selected,
        }
    }

    #[test]
    fn selected_record_wins() {
        let store = KeyStore::in_memory(vec![
            record("anthropic", "old", false),
            record("anthropic", "sk-live", true),
        ]);
        assert_eq!(store.api_key("anthropic").as_deref(), Some("sk-live"));
    }

    #[test]
    fn falls_back_to_other_selected_provider() {
        let store = KeyStore::in_memory(vec![record("openai", "sk-gw", true)]);
        assert_eq!(store.api_key("anthropic").as_deref(), Some("sk-gw"));
    }

    #[test]
    fn insert_enforces_single_selection() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::open(dir.path().join("keys.json")).unwrap();
        store.insert(record("anthropic", "first", true)).unwrap();
        store.insert(record("anthropic", "second", true)).unwrap();

        let selected: Vec<_> = store
            .records()
            .into_iter()
            .filter(|r| r.is_selected && r.provider == "anthropic")
            .collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].api_key, "second");
    }

    #[test]
    fn records_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        {
            let store = KeyStore::open(&path).unwrap();
            store.insert(record("anthropic", "sk-1", true)).unwrap();
        }
        let reopened = KeyStore::open(&path).unwrap();
        assert_eq!(reopened.api_key("anthropic").as_deref(), Some("sk-1"));
    }

    #[test]
    fn record_serde_uses_snake_case() {
        let r = record("anthropic", "sk", true);
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("api_key").is_some());
        assert!(v.get("is_selected").is_some());
    }
}
