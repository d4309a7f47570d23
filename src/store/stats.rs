//! Aggregate download statistics.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{load_or_default, write_json_atomic};

/// Persisted counters across all runs
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsAggregate {
    /// Items that reached a terminal state
    #[serde(default)]
    pub total_downloads: u64,

    /// Megabytes written
    #[serde(default)]
    pub total_size_mb: f64,

    /// Wall-clock hours spent on items
    #[serde(default)]
    pub total_time_hours: f64,

    /// Successful items
    #[serde(default)]
    pub success_count: u64,

    /// Failed items
    #[serde(default)]
    pub fail_count: u64,

    /// Mean throughput over successful transfers that moved bytes
    #[serde(default)]
    pub avg_speed_mbps: f64,

    /// Number of samples folded into `avg_speed_mbps`
    #[serde(default)]
    pub speed_samples: u64,
}

impl StatsAggregate {
    /// Fold one terminal outcome into the aggregate
    ///
    /// Only successful transfers with data and a measurable duration are speed samples;
    /// failures and skips count towards the totals but leave the average alone.
    pub fn record(&mut self, success: bool, size_mb: f64, elapsed_secs: f64) {
        self.total_downloads += 1;
        if success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
        self.total_size_mb += size_mb;
        self.total_time_hours += elapsed_secs / 3600.0;

        if success && size_mb > 0.0 && elapsed_secs > 0.0 {
            let speed = size_mb / elapsed_secs;
            // Files written before sample counting existed carry an average but no count
            let samples = if self.speed_samples == 0 && self.avg_speed_mbps > 0.0 {
                1
            } else {
                self.speed_samples
            };
            self.avg_speed_mbps = (self.avg_speed_mbps * samples as f64 + speed) / (samples + 1) as f64;
            self.speed_samples = samples + 1;
        }
    }

    /// Fraction of terminal items that succeeded, `None` before the first item
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_downloads == 0 {
            None
        } else {
            Some(self.success_count as f64 / self.total_downloads as f64)
        }
    }
}

/// JSON-backed [`StatsAggregate`] with internal locking
pub struct StatsStore {
    path: PathBuf,
    inner: Mutex<StatsAggregate>,
}

impl StatsStore {
    /// Open the stats file at `path` (zeroed if missing or corrupt)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner: StatsAggregate = load_or_default(&path, "stats");
        Self {
            path,
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsAggregate> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one terminal outcome and persist
    pub fn update(&self, success: bool, size_mb: f64, elapsed_secs: f64) {
        let mut stats = self.lock();
        stats.record(success, size_mb, elapsed_secs);
        self.persist(&stats);
    }

    /// Copy of the current aggregate
    pub fn summary(&self) -> StatsAggregate {
        self.lock().clone()
    }

    /// Zero every counter and persist
    pub fn reset(&self) {
        let mut stats = self.lock();
        *stats = StatsAggregate::default();
        self.persist(&stats);
    }

    fn persist(&self, stats: &StatsAggregate) {
        if let Err(e) = write_json_atomic(&self.path, stats) {
            tracing::warn!(error = %e, "failed to persist stats");
        }
    }
}
