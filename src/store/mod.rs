//! File-backed persistence for reel-dl
//!
//! Each store is a single JSON document rewritten wholesale on every mutation.
//! Writes go to a sibling temp file that is then renamed over the target, so a crash
//! leaves either the old or the new document, never a torn one. Nothing here is
//! transactional across files.
//!
//! ## Submodules
//!
//! - [`history`] - append-only log of attempted items
//! - [`stats`] - running aggregate counters
//! - [`snapshot`] - pending-work snapshot for restart recovery
//!
//! Read and write failures are logged and swallowed: a missing or corrupt file loads as
//! empty state and the caller carries on.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

pub mod history;
pub mod snapshot;
pub mod stats;

pub use history::HistoryStore;
pub use snapshot::{QueueSnapshot, SnapshotStore};
pub use stats::{StatsAggregate, StatsStore};

/// Read and parse a JSON document
///
/// Returns `Ok(None)` if the file does not exist.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Persistence {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Persistence {
            path: path.to_path_buf(),
            reason: format!("corrupt document: {}", e),
        })
}

/// Load a document, falling back to `T::default()` on any failure
pub(crate) fn load_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(store = what, error = %e, "could not load state file, starting empty");
            T::default()
        }
    }
}

/// Serialize `value` and atomically replace `path` with it
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let persistence_err = |reason: String| Error::Persistence {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| persistence_err(e.to_string()))?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = crate::utils::partial_path(path);
    std::fs::write(&tmp, &json).map_err(|e| persistence_err(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        persistence_err(e.to_string())
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("doc.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        let back: Option<Vec<i32>> = read_json(&path).unwrap();

        assert_eq!(back, Some(vec![1, 2, 3]));
        assert!(
            !crate::utils::partial_path(&path).exists(),
            "temp file should be renamed away"
        );
    }

    #[test]
    fn test_read_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let back: Option<Vec<i32>> = read_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn test_corrupt_document_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result: Result<Option<Vec<i32>>> = read_json(&path);
        assert!(matches!(result, Err(Error::Persistence { .. })));

        let fallback: Vec<i32> = load_or_default(&path, "test");
        assert!(fallback.is_empty());
    }
}
