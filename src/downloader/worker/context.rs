//! Worker context: everything one item needs, detached from the orchestrator.

use crate::client::{HttpFetcher, MetadataClient};
use crate::config::{DownloadOptions, RetryConfig};
use crate::rate_limiter::RateLimiter;
use crate::store::HistoryStore;
use crate::transcode::Transcoder;
use crate::types::Event;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::super::ReelDownloader;

/// Per-item state handed to a worker task
///
/// Options are copied at dispatch, so a later `set_download_options` never changes an
/// item that is already running.
pub(crate) struct WorkerContext {
    /// Queue URL being processed
    pub(crate) url: String,
    pub(crate) client: Arc<dyn MetadataClient>,
    pub(crate) fetcher: HttpFetcher,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) history: Arc<HistoryStore>,
    pub(crate) transcoder: Arc<dyn Transcoder>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) download_dir: PathBuf,
    /// Longest wait for the next body chunk
    pub(crate) chunk_timeout: Duration,
    pub(crate) retry: RetryConfig,
    pub(crate) options: DownloadOptions,
    /// Fires when the run is stopped
    pub(crate) cancel: CancellationToken,
}

impl WorkerContext {
    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

impl ReelDownloader {
    /// Snapshot the shared handles and current options for one item
    pub(crate) fn worker_context(
        &self,
        url: String,
        options: DownloadOptions,
        cancel: CancellationToken,
    ) -> WorkerContext {
        WorkerContext {
            url,
            client: Arc::clone(&self.client),
            fetcher: self.fetcher.clone(),
            rate_limiter: self.rate_limiter.clone(),
            history: Arc::clone(&self.persistence.history),
            transcoder: Arc::clone(&self.transcoder),
            event_tx: self.event_tx.clone(),
            download_dir: self.config.download_dir().clone(),
            chunk_timeout: self.config.download.chunk_timeout,
            retry: self.config.retry.clone(),
            options,
            cancel,
        }
    }
}
