//! Run control: start, stop and retry.

use crate::error::{Error, Result};
use crate::types::{Event, RunState, RunSummary};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ReelDownloader;

impl ReelDownloader {
    /// Start processing the pending queue
    ///
    /// Every precondition is checked before any item is admitted. On success the
    /// per-run counters are reset and the coordinator is spawned; its handle resolves to
    /// the run's summary. [`ReelDownloader::wait`] gives the same summary without the
    /// handle.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if a run is active
    /// - [`Error::EmptyQueue`] if nothing is pending
    /// - [`Error::DestinationUnavailable`] if the download directory is not writable
    /// - [`Error::InsufficientSpace`] if free space is below the configured floor
    /// - [`Error::Unreachable`] if the connectivity probe fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use reel_dl::*;
    /// # async fn example(downloader: ReelDownloader) -> Result<()> {
    /// downloader.enqueue(["https://www.instagram.com/reel/Cabc123/"]).await;
    /// let run = downloader.start().await?;
    /// let summary = run.await.expect("coordinator panicked");
    /// println!("{}", summary.message());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self) -> Result<JoinHandle<RunSummary>> {
        {
            let state = self.state.lock().await;
            Self::check_startable(&state)?;
        }

        self.check_preconditions().await?;

        let (cancel, total) = {
            let mut state = self.state.lock().await;
            // Another caller may have started a run while we were probing
            Self::check_startable(&state)?;

            state.completed = 0;
            state.succeeded = 0;
            state.total = state.pending.len();
            state.stop_requested = false;
            state.run_state = RunState::Running;
            state.cancel = CancellationToken::new();
            self.summary_tx.send_replace(None);

            (state.cancel.clone(), state.total)
        };

        tracing::info!(
            total,
            concurrency = self.config.download.max_concurrent_downloads,
            "Starting downloads"
        );
        self.emit_event(Event::Started { total });

        let downloader = self.clone();
        Ok(tokio::spawn(async move {
            downloader.run_coordinator(cancel).await
        }))
    }

    fn check_startable(state: &super::OrchestratorState) -> Result<()> {
        if state.is_active() {
            return Err(Error::AlreadyRunning);
        }
        if state.pending.is_empty() {
            return Err(Error::EmptyQueue);
        }
        Ok(())
    }

    /// Request the current run to stop
    ///
    /// No new items are admitted. In-flight transfers abort at their next chunk and
    /// backoff waits end immediately; a metadata call already in progress is allowed to
    /// return. Pending items stay queued for the next run.
    ///
    /// Returns `false` if no run was active.
    pub async fn stop(&self) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.run_state != RunState::Running {
                return false;
            }
            state.stop_requested = true;
            state.run_state = RunState::Stopping;
            state.cancel.cancel();
        }

        tracing::info!("Stop requested");
        self.emit_event(Event::Stopping);
        true
    }

    /// Move every failed item back to the pending queue and start a run
    ///
    /// # Errors
    ///
    /// Returns [`Error::NothingToRetry`] when the failed list is empty,
    /// [`Error::AlreadyRunning`] while a run is active, or any error from
    /// [`ReelDownloader::start`]. If `start` fails the items stay pending.
    pub async fn retry_failed(&self) -> Result<JoinHandle<RunSummary>> {
        {
            let mut state = self.state.lock().await;
            if state.is_active() {
                return Err(Error::AlreadyRunning);
            }
            if state.failed.is_empty() {
                return Err(Error::NothingToRetry);
            }

            let failed = std::mem::take(&mut state.failed);
            tracing::info!(count = failed.len(), "Re-queueing failed items");
            state.pending.extend(failed);
            self.save_snapshot(&state);
        }

        self.start().await
    }
}
