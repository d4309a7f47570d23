//! Core types and events for reel-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Short identifier extracted from a post URL
///
/// Used as the idempotency key for history lookups and as the filename stem.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shortcode(pub String);

impl Shortcode {
    /// Create a new Shortcode
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Shortcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Shortcode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Kind of asset a post resolved to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video (reels, video posts)
    Video,
    /// Still image
    Image,
}

impl MediaType {
    /// File extension used for saved assets
    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Video => "mp4",
            MediaType::Image => "jpg",
        }
    }

    /// Subdirectory name for the by-type organization scheme
    pub fn folder_name(&self) -> &'static str {
        match self {
            MediaType::Video => "videos",
            MediaType::Image => "images",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Video => f.write_str("video"),
            MediaType::Image => f.write_str("image"),
        }
    }
}

/// One attempted item in the history log. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Post shortcode
    pub shortcode: Shortcode,
    /// URL the item was queued as
    pub url: String,
    /// When the item reached its terminal state
    pub timestamp: DateTime<Utc>,
    /// Whether the item succeeded
    pub success: bool,
    /// Asset kind (video when unknown)
    pub media_type: MediaType,
}

/// Lifecycle of the orchestrator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run has been started yet
    #[default]
    Idle,
    /// Admitting and processing items
    Running,
    /// Stop requested; waiting for in-flight items
    Stopping,
    /// Last run reached its end
    Finished,
}

/// What a worker produced for one item
#[derive(Clone, Debug)]
pub enum ItemOutcome {
    /// Item is done
    Success(ItemSuccess),
    /// Item failed terminally
    Failed(ItemFailure),
}

impl ItemOutcome {
    /// Whether the item succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }

    /// Queue URL of the item
    pub fn url(&self) -> &str {
        match self {
            ItemOutcome::Success(s) => &s.url,
            ItemOutcome::Failed(f) => &f.url,
        }
    }
}

/// Details of a successful item
#[derive(Clone, Debug)]
pub struct ItemSuccess {
    /// Queue URL
    pub url: String,
    /// Post shortcode
    pub shortcode: Shortcode,
    /// Asset kind of the primary file
    pub media_type: MediaType,
    /// Files written (or found already present)
    pub files: Vec<PathBuf>,
    /// Bytes fetched over the network for this item
    pub bytes_downloaded: u64,
    /// Wall-clock time spent on the item
    pub elapsed: Duration,
    /// Why no download was needed, if it was skipped
    pub skipped: Option<SkipReason>,
}

/// Why a successful item did not need a download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// History already records a success for the shortcode
    InHistory,
    /// Final file already present on disk
    FileExists,
}

/// Details of a failed item
#[derive(Clone, Debug)]
pub struct ItemFailure {
    /// Queue URL
    pub url: String,
    /// Shortcode, when the URL could be parsed
    pub shortcode: Option<Shortcode>,
    /// Asset kind, when metadata was resolved
    pub media_type: Option<MediaType>,
    /// Human-readable reason
    pub reason: String,
    /// Attempts made before giving up
    pub attempts: u32,
    /// Whether the failure was caused by a stop request
    pub cancelled: bool,
    /// Wall-clock time spent on the item
    pub elapsed: Duration,
}

/// Final tally of a run, produced exactly once per run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items that reached a terminal state
    pub completed: usize,
    /// Items that succeeded
    pub succeeded: usize,
    /// Items that failed
    pub failed: usize,
    /// Whether the run ended because of a stop request
    pub stopped: bool,
}

impl RunSummary {
    /// Line shown to the user when the run ends
    pub fn message(&self) -> String {
        let mut msg = format!(
            "All downloads finished: {} succeeded, {} failed",
            self.succeeded, self.failed
        );
        if self.stopped {
            msg.push_str(" (stopped)");
        }
        if self.failed > 0 {
            msg.push_str(". Use retry to try the failed downloads again");
        }
        msg
    }
}

/// Read-only view of the orchestrator state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items waiting to be admitted
    pub pending: usize,
    /// Items in the failed list
    pub failed: usize,
    /// Items currently being processed
    pub in_flight: usize,
    /// Items finished in the current run
    pub completed: usize,
    /// Items the current run started with (plus any added while running)
    pub total: usize,
    /// Lifecycle state
    pub run_state: RunState,
}

/// Event emitted during downloads
///
/// This is the running log the UI renders; every event is timestamped by the receiver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// URLs added to the pending queue
    Queued {
        /// Number of URLs accepted
        added: usize,
        /// Pending queue length afterwards
        queue_len: usize,
    },

    /// A run started
    Started {
        /// Items in the queue when the run started
        total: usize,
    },

    /// A worker picked up an item
    ItemStarted {
        /// Queue URL
        url: String,
    },

    /// A transient failure will be retried
    Retrying {
        /// Queue URL
        url: String,
        /// Attempt that just failed (1-based)
        attempt: u32,
        /// Wait before the next attempt
        delay_ms: u64,
        /// Error that caused the retry
        error: String,
    },

    /// Item was already done
    ItemSkipped {
        /// Post shortcode
        shortcode: Shortcode,
        /// Why it was skipped
        reason: SkipReason,
    },

    /// Item downloaded
    ItemComplete {
        /// Queue URL
        url: String,
        /// Post shortcode
        shortcode: Shortcode,
        /// Files written
        files: Vec<PathBuf>,
        /// Bytes fetched
        size_bytes: u64,
    },

    /// Item failed terminally
    ItemFailed {
        /// Queue URL
        url: String,
        /// Error message
        error: String,
    },

    /// A post-processing step failed; the item still counts as a success
    PostProcessWarning {
        /// Post shortcode
        shortcode: Shortcode,
        /// Step name (compress, extract_audio, thumbnail)
        step: String,
        /// What went wrong
        message: String,
    },

    /// Progress after each completed item
    Progress {
        /// Items finished so far
        completed: usize,
        /// Items in this run
        total: usize,
    },

    /// Stop requested
    Stopping,

    /// Run ended
    Finished {
        /// Final tally
        summary: RunSummary,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_record_json_shape() {
        let record = HistoryRecord {
            shortcode: Shortcode::new("C1a2B3"),
            url: "https://www.instagram.com/reel/C1a2B3/".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            success: true,
            media_type: MediaType::Video,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["shortcode"], "C1a2B3");
        assert_eq!(json["media_type"], "video");
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_summary_message_invites_retry_on_failure() {
        let ok = RunSummary {
            completed: 3,
            succeeded: 3,
            failed: 0,
            stopped: false,
        };
        assert!(!ok.message().contains("retry"));

        let partial = RunSummary {
            completed: 3,
            succeeded: 2,
            failed: 1,
            stopped: false,
        };
        assert!(partial.message().contains("2 succeeded, 1 failed"));
        assert!(partial.message().contains("retry"));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = Event::Progress {
            completed: 1,
            total: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["total"], 4);
    }

    #[test]
    fn test_outcome_accessors() {
        let failure = ItemOutcome::Failed(ItemFailure {
            url: "https://www.instagram.com/p/abc/".to_string(),
            shortcode: Some(Shortcode::new("abc")),
            media_type: None,
            reason: "boom".to_string(),
            attempts: 1,
            cancelled: false,
            elapsed: Duration::ZERO,
        });
        assert!(!failure.is_success());
        assert_eq!(failure.url(), "https://www.instagram.com/p/abc/");
    }
}
