//! Queue snapshot for restart recovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{read_json, write_json_atomic};
use crate::error::Result;

/// On-disk shape of `queue.json`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Items not yet admitted, in FIFO order
    #[serde(default)]
    pub pending: Vec<String>,

    /// Items admitted but not completed when the snapshot was taken
    #[serde(default)]
    pub in_flight: Vec<String>,

    /// When the snapshot was written
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl QueueSnapshot {
    /// Items to re-queue on restore: in-flight work first, then pending
    pub fn restorable(self) -> Vec<String> {
        let mut items = self.in_flight;
        items.extend(self.pending);
        items
    }
}

/// Reads and writes the queue snapshot file
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Snapshot store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the snapshot with the given queue contents
    pub fn save<'a, P, F>(&self, pending: P, in_flight: F) -> Result<()>
    where
        P: IntoIterator<Item = &'a String>,
        F: IntoIterator<Item = &'a String>,
    {
        let snapshot = QueueSnapshot {
            pending: pending.into_iter().cloned().collect(),
            in_flight: in_flight.into_iter().cloned().collect(),
            saved_at: Some(Utc::now()),
        };
        write_json_atomic(&self.path, &snapshot)
    }

    /// Items to restore, in-flight first. Missing or corrupt snapshots restore nothing.
    pub fn load(&self) -> Vec<String> {
        match read_json::<QueueSnapshot>(&self.path) {
            Ok(Some(snapshot)) => {
                let items = snapshot.restorable();
                if !items.is_empty() {
                    tracing::info!(items = items.len(), "restored queue snapshot");
                }
                items
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable queue snapshot");
                Vec::new()
            }
        }
    }

    /// Delete the snapshot (no-op if absent)
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "queue snapshot removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, "failed to remove queue snapshot"),
        }
    }
}
