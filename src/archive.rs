//! Poetry archive — in-memory map of generated poems, persisted as a
//! single JSON artifact.
//!
//! Keys are generation timestamps (RFC 3339). Two entries generated
//! within the same timestamp resolution collide and the later one wins;
//! that overwrite is inherited behavior, kept as-is. `persist()` rewrites
//! the whole artifact, never appends.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::extract::PacketRecord;
use crate::prompt::PoetryStyle;

/// One generated poem plus the batch and style that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub poetry: String,
    /// Frozen snapshot of the drained batch, not a live view.
    pub packets: Vec<PacketRecord>,
    pub style: PoetryStyle,
    /// RFC 3339 generation timestamp; doubles as the archive key.
    pub generated_at: String,
}

impl ArchiveEntry {
    pub fn new(poetry: String, packets: Vec<PacketRecord>, style: PoetryStyle) -> Self {
        Self {
            poetry,
            packets,
            style,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Errors from archive persistence.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to write archive to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read archive from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Archive serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Mapping from generation timestamp to archive entry, with a home on
/// disk. Grows for the life of the process.
pub struct PoetryArchive {
    entries: Mutex<BTreeMap<String, ArchiveEntry>>,
    path: PathBuf,
}

impl PoetryArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            path: path.into(),
        }
    }

    /// Insert an entry keyed by its `generated_at`. An existing entry
    /// under the same key is overwritten, not merged.
    pub fn record_entry(&self, entry: ArchiveEntry) {
        self.lock().insert(entry.generated_at.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of one entry, for inspection.
    pub fn get(&self, key: &str) -> Option<ArchiveEntry> {
        self.lock().get(key).cloned()
    }

    /// Serialize the full mapping to the artifact, replacing any prior
    /// content entirely.
    pub fn persist(&self) -> Result<(), ArchiveError> {
        let json = {
            let entries = self.lock();
            serde_json::to_string_pretty(&*entries)?
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        std::fs::write(&self.path, json).map_err(|source| ArchiveError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(path = %self.path.display(), entries = self.len(), "Poetry archive saved");
        Ok(())
    }

    /// Read a persisted artifact back into a plain mapping.
    pub fn load(path: &Path) -> Result<BTreeMap<String, ArchiveEntry>, ArchiveError> {
        let json = std::fs::read_to_string(path).map_err(|source| ArchiveError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ArchiveEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
