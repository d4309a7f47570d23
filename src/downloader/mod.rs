//! Core downloader implementation split into focused submodules.
//!
//! The `ReelDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Pending/failed queue management and accessors
//! - [`control`] - Run control (start/stop/retry)
//! - [`lifecycle`] - Start preconditions, waiting and shutdown
//! - [`queue_processor`] - The per-run coordinator that admits and settles items
//! - [`worker`] - Per-item download execution
//! - [`post_process`] - Compression, audio extraction and thumbnails

mod control;
mod lifecycle;
mod post_process;
mod queue;
mod queue_processor;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::client::{HttpFetcher, MetadataClient};
use crate::config::{Config, DownloadOptions};
use crate::error::Result;
use crate::rate_limiter::RateLimiter;
use crate::store::{HistoryStore, SnapshotStore, StatsStore};
use crate::transcode::Transcoder;
use crate::types::{Event, QueueStats, RunState, RunSummary, Shortcode};
use crate::utils::extract_shortcode;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Mutable queue and run bookkeeping, guarded by one lock
#[derive(Debug, Default)]
pub(crate) struct OrchestratorState {
    /// Items waiting for admission, FIFO
    pub(crate) pending: VecDeque<String>,
    /// Items whose last attempt failed
    pub(crate) failed: Vec<String>,
    /// Items handed to a worker and not yet settled
    pub(crate) in_flight: Vec<String>,
    /// Items settled in the current run
    pub(crate) completed: usize,
    /// Items that succeeded in the current run
    pub(crate) succeeded: usize,
    /// Items in the current run (initial queue plus additions while running)
    pub(crate) total: usize,
    pub(crate) run_state: RunState,
    /// Set by `stop()`; cleared at the next `start()`
    pub(crate) stop_requested: bool,
    /// Cancellation for the current run
    pub(crate) cancel: CancellationToken,
}

impl OrchestratorState {
    pub(crate) fn is_active(&self) -> bool {
        matches!(self.run_state, RunState::Running | RunState::Stopping)
    }

    /// Take the first pending item whose shortcode is not already in flight
    ///
    /// A second copy of a post waits until the first settles, so it finds the history
    /// record instead of racing the first copy onto the same file.
    pub(crate) fn next_admissible(&mut self) -> Option<String> {
        let busy: HashSet<Shortcode> = self
            .in_flight
            .iter()
            .filter_map(|url| extract_shortcode(url))
            .collect();
        let pos = self
            .pending
            .iter()
            .position(|url| extract_shortcode(url).is_none_or(|code| !busy.contains(&code)))?;
        self.pending.remove(pos)
    }

    pub(crate) fn queue_stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            failed: self.failed.len(),
            in_flight: self.in_flight.len(),
            completed: self.completed,
            total: self.total,
            run_state: self.run_state,
        }
    }
}

/// JSON-backed state shared by every run
#[derive(Clone)]
pub(crate) struct Persistence {
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) stats: Arc<StatsStore>,
    pub(crate) snapshot: Arc<SnapshotStore>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ReelDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Resolves shortcodes into media URLs
    pub(crate) client: Arc<dyn MetadataClient>,
    /// HTTP client for media bytes
    pub(crate) fetcher: HttpFetcher,
    /// Sliding-window limiter shared by all workers
    pub(crate) rate_limiter: RateLimiter,
    /// History, stats and queue snapshot
    pub(crate) persistence: Persistence,
    /// Post-processing tool (ffmpeg or no-op)
    pub(crate) transcoder: Arc<dyn Transcoder>,
    /// Queue and run state
    pub(crate) state: Arc<tokio::sync::Mutex<OrchestratorState>>,
    /// Options applied to items at dispatch time
    pub(crate) options: Arc<tokio::sync::RwLock<DownloadOptions>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Latest run summary; `None` while a run is in progress or before the first run
    pub(crate) summary_tx: Arc<tokio::sync::watch::Sender<Option<RunSummary>>>,
    /// Signalled when items are queued during a run
    pub(crate) admit_notify: Arc<tokio::sync::Notify>,
}

impl ReelDownloader {
    /// Create a new downloader
    ///
    /// Opens the history, stats and snapshot files under the configured state
    /// directory, restores any queue left over from a previous session and picks a
    /// transcoder. No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid settings, or an error
    /// if the HTTP client cannot be built.
    pub async fn new(config: Config, client: Arc<dyn MetadataClient>) -> Result<Self> {
        config.validate()?;

        let fetcher = HttpFetcher::new(&config.network)?;
        let rate_limiter = RateLimiter::from_config(&config.rate_limit);

        let persistence = Persistence {
            history: Arc::new(HistoryStore::open(config.persistence.history_path())),
            stats: Arc::new(StatsStore::open(config.persistence.stats_path())),
            snapshot: Arc::new(SnapshotStore::new(config.persistence.queue_path())),
        };

        let transcoder = crate::transcode::detect(&config.tools);
        let caps = transcoder.capabilities();
        tracing::info!(
            transcoder = transcoder.name(),
            can_compress = caps.can_compress,
            can_extract_audio = caps.can_extract_audio,
            "Transcoder initialized"
        );

        let (event_tx, _rx) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (summary_tx, _summary_rx) = tokio::sync::watch::channel(None);

        let downloader = Self {
            options: Arc::new(tokio::sync::RwLock::new(config.options.clone())),
            config: Arc::new(config),
            client,
            fetcher,
            rate_limiter,
            persistence,
            transcoder,
            state: Arc::new(tokio::sync::Mutex::new(OrchestratorState::default())),
            event_tx,
            summary_tx: Arc::new(summary_tx),
            admit_notify: Arc::new(tokio::sync::Notify::new()),
        };

        downloader.restore_queue().await;

        Ok(downloader)
    }

    /// Replace the transcoder picked at construction
    #[must_use]
    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        tracing::debug!(transcoder = transcoder.name(), "Transcoder replaced");
        self.transcoder = transcoder;
        self
    }

    /// Subscribe to download events
    ///
    /// Each subscriber receives every event independently. A subscriber that falls more
    /// than 1000 events behind gets `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reel_dl::{Config, ReelDownloader, UnconfiguredClient};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = ReelDownloader::new(Config::default(), Arc::new(UnconfiguredClient)).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("{:?}", event);
    ///         }
    ///     });
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// What the configured transcoder can do
    pub fn capabilities(&self) -> crate::transcode::TranscoderCapabilities {
        self.transcoder.capabilities()
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Persist the queue snapshot for the given state
    ///
    /// Failures are logged; the run carries on with only in-memory state.
    pub(crate) fn save_snapshot(&self, state: &OrchestratorState) {
        if let Err(e) = self
            .persistence
            .snapshot
            .save(&state.pending, &state.in_flight)
        {
            tracing::warn!(error = %e, "failed to persist queue snapshot");
        }
    }
}
