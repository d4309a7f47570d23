//! Start preconditions, waiting for a run, and shutdown.

use crate::error::Result;
use crate::types::{RunState, RunSummary};
use crate::utils::{check_free_space, ensure_writable_dir};
use std::time::Duration;

use super::ReelDownloader;

/// How long `shutdown` waits for in-flight items
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ReelDownloader {
    /// Checks that must pass before a run may begin
    pub(crate) async fn check_preconditions(&self) -> Result<()> {
        let download_dir = self.config.download_dir();
        ensure_writable_dir(download_dir).await?;
        check_free_space(download_dir, self.config.download.min_free_space)?;

        if let Some(url) = &self.config.network.connectivity_check_url {
            self.fetcher.check_connectivity(url).await?;
        }
        Ok(())
    }

    /// Wait for the current run to end
    ///
    /// Returns the summary of the current run, or of the last one if none is active.
    /// Returns `None` if no run has ever finished.
    pub async fn wait(&self) -> Option<RunSummary> {
        let (run_state, mut rx) = {
            let state = self.state.lock().await;
            (state.run_state, self.summary_tx.subscribe())
        };

        match run_state {
            RunState::Idle => None,
            RunState::Finished => *rx.borrow(),
            RunState::Running | RunState::Stopping => {
                // The coordinator publishes the summary before the sender could be dropped,
                // and the sender lives as long as any downloader clone.
                rx.wait_for(Option::is_some).await.ok().and_then(|s| *s)
            }
        }
    }

    /// Gracefully shut down
    ///
    /// 1. Stops the current run (if any)
    /// 2. Waits up to 30 seconds for in-flight items to settle
    /// 3. Writes a final queue snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the final snapshot cannot be written.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.stop().await;
        let active = self.state.lock().await.is_active();
        if active {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait()).await {
                Ok(summary) => {
                    tracing::info!(?summary, "Run ended before shutdown");
                }
                Err(_) => {
                    tracing::warn!("Timeout waiting for in-flight items, proceeding with shutdown");
                }
            }
        }

        let state = self.state.lock().await;
        self.persistence
            .snapshot
            .save(&state.pending, &state.in_flight)?;

        tracing::info!(
            pending = state.pending.len(),
            in_flight = state.in_flight.len(),
            "Shutdown complete"
        );
        Ok(())
    }
}
