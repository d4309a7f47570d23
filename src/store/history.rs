//! History log: every item that reached a terminal state.

use crate::types::{HistoryRecord, Shortcode};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{load_or_default, write_json_atomic};

/// CSV header for [`HistoryStore::export_csv`]
const CSV_HEADER: &str = "shortcode,url,timestamp,success,media_type";

/// Append-only, insertion-ordered history log backed by a JSON file
///
/// Records are never mutated; the only way to remove one is [`HistoryStore::clear`].
pub struct HistoryStore {
    path: PathBuf,
    records: Mutex<Vec<HistoryRecord>>,
}

impl HistoryStore {
    /// Open the log at `path`, loading existing records (empty if missing or corrupt)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records: Vec<HistoryRecord> = load_or_default(&path, "history");
        tracing::debug!(path = %path.display(), records = records.len(), "history loaded");
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a successful record exists for `shortcode`
    ///
    /// Failed attempts are recorded too, but they never count as "already downloaded".
    pub fn exists(&self, shortcode: &Shortcode) -> bool {
        self.lock()
            .iter()
            .any(|r| r.success && &r.shortcode == shortcode)
    }

    /// Append a record and rewrite the file
    ///
    /// A write failure is logged; the record stays in memory.
    pub fn append(&self, record: HistoryRecord) {
        let mut records = self.lock();
        records.push(record);
        if let Err(e) = write_json_atomic(&self.path, &*records) {
            tracing::warn!(error = %e, "failed to persist history");
        }
    }

    /// All records in insertion order
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.lock().clone()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Render all records as CSV rows (with header)
    pub fn export_csv(&self) -> String {
        let records = self.lock();
        let mut out = String::with_capacity(64 * (records.len() + 1));
        out.push_str(CSV_HEADER);
        out.push('\n');
        for r in records.iter() {
            let row = [
                csv_field(r.shortcode.as_str()),
                csv_field(&r.url),
                r.timestamp.to_rfc3339(),
                r.success.to_string(),
                r.media_type.to_string(),
            ];
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    /// Write the CSV export to `path`
    pub fn export_to(&self, path: &Path) -> crate::Result<()> {
        std::fs::write(path, self.export_csv())?;
        tracing::info!(path = %path.display(), "history exported");
        Ok(())
    }

    /// Wipe every record and persist the empty log
    pub fn clear(&self) {
        let mut records = self.lock();
        records.clear();
        if let Err(e) = write_json_atomic(&self.path, &*records) {
            tracing::warn!(error = %e, "failed to persist cleared history");
        }
    }
}

/// Quote a CSV field if it contains a separator, quote or newline
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaType;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(code: &str, success: bool) -> HistoryRecord {
        HistoryRecord {
            shortcode: Shortcode::new(code),
            url: format!("https://www.instagram.com/reel/{}/", code),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            success,
            media_type: MediaType::Video,
        }
    }

    #[test]
    fn test_append_persists_and_reloads_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");

        let store = HistoryStore::open(&path);
        store.append(record("a", true));
        store.append(record("b", false));
        store.append(record("c", true));

        let reopened = HistoryStore::open(&path);
        let codes: Vec<_> = reopened
            .records()
            .into_iter()
            .map(|r| r.shortcode.0)
            .collect();
        assert_eq!(codes, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_exists_ignores_failed_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::open(temp_dir.path().join("history.json"));

        store.append(record("failed-one", false));
        assert!(!store.exists(&Shortcode::new("failed-one")));

        store.append(record("failed-one", true));
        assert!(store.exists(&Shortcode::new("failed-one")));
        assert!(!store.exists(&Shortcode::new("never-seen")));
    }

    #[test]
    fn test_export_csv_rows() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::open(temp_dir.path().join("history.json"));
        store.append(record("a", true));

        let mut odd = record("b", false);
        odd.url = "https://www.instagram.com/p/b/?x=1,2".to_string();
        odd.media_type = MediaType::Image;
        store.append(odd);

        let csv = store.export_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "a,https://www.instagram.com/reel/a/,2024-01-02T03:04:05+00:00,true,video"
        );
        assert!(lines[2].starts_with("b,\"https://www.instagram.com/p/b/?x=1,2\","));
        assert!(lines[2].ends_with(",false,image"));
    }

    #[test]
    fn test_export_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = HistoryStore::open(temp_dir.path().join("history.json"));
        store.append(record("a", true));

        let out = temp_dir.path().join("export.csv");
        store.export_to(&out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), store.export_csv());
    }

    #[test]
    fn test_clear_wipes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");
        let store = HistoryStore::open(&path);
        store.append(record("a", true));
        store.clear();

        assert!(store.is_empty());
        assert!(HistoryStore::open(&path).is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.json");
        std::fs::write(&path, "[{\"shortcode\":").unwrap();

        let store = HistoryStore::open(&path);
        assert!(store.is_empty());

        // Still usable afterwards
        store.append(record("x", true));
        assert_eq!(HistoryStore::open(&path).len(), 1);
    }
}
