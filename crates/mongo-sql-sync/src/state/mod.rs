//! File-based sync state: last run time and per-document content hashes.

use crate::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persisted state of the previous sync of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Start time of the run that wrote this state.
    #[serde(rename = "LastSyncTime")]
    pub last_sync_time: DateTime<Utc>,

    /// Document id to content hash (hex SHA-256).
    #[serde(rename = "DocumentHashes", default)]
    pub document_hashes: BTreeMap<String, String>,
}

impl SyncState {
    /// Create an empty state stamped with `last_sync_time`.
    pub fn new(last_sync_time: DateTime<Utc>) -> Self {
        Self {
            last_sync_time,
            document_hashes: BTreeMap::new(),
        }
    }

    /// Location of the state file for `table` under `dir`.
    pub fn path_for(dir: &Path, table: &str) -> PathBuf {
        dir.join(format!("sync_state_{}.json", table))
    }

    /// Load state from a file; `Ok(None)` when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content).map_err(|e| {
            SyncError::State(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Ok(Some(state))
    }

    /// Save state to a file (atomic write).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::State(format!("Failed to serialize state: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    pub fn hash_for(&self, id: &str) -> Option<&str> {
        self.document_hashes.get(id).map(String::as_str)
    }
}
