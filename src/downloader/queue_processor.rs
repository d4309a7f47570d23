//! Queue processor: admits pending items into workers and settles their outcomes.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::types::{Event, HistoryRecord, ItemOutcome, MediaType, RunState, RunSummary, SkipReason};

use super::worker;
use super::{Persistence, ReelDownloader};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

impl ReelDownloader {
    /// Drive one run to completion
    ///
    /// Loops until nothing is in flight and nothing can be admitted:
    /// 1. Fills every free concurrency permit from the pending queue
    ///    (unless a stop was requested)
    /// 2. Waits for the next worker to finish, or for items queued mid-run
    /// 3. Settles a finished worker's outcome
    ///
    /// Admission is FIFO, except that a post already in flight is held back until its
    /// first copy settles. Completion order is whatever the workers produce.
    pub(crate) async fn run_coordinator(self, cancel: CancellationToken) -> RunSummary {
        let permits = Arc::new(Semaphore::new(self.config.download.max_concurrent_downloads));
        let mut workers: JoinSet<(String, ItemOutcome)> = JoinSet::new();

        loop {
            self.admit_pending(&permits, &mut workers, &cancel).await;

            if workers.is_empty() {
                match self.finish_run().await {
                    Some(summary) => return summary,
                    // Items arrived after the last admission pass
                    None => continue,
                }
            }

            tokio::select! {
                joined = workers.join_next() => match joined {
                    Some(Ok((url, outcome))) => self.settle(url, outcome).await,
                    Some(Err(e)) => {
                        // Worker panics are caught inside the task; this is an abort
                        tracing::error!(error = %e, "Worker task did not complete");
                    }
                    None => {}
                },
                _ = self.admit_notify.notified() => {
                    tracing::debug!("Items queued during run");
                }
            }
        }
    }

    /// Spawn workers for pending items while permits are free
    async fn admit_pending(
        &self,
        permits: &Arc<Semaphore>,
        workers: &mut JoinSet<(String, ItemOutcome)>,
        cancel: &CancellationToken,
    ) {
        loop {
            let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
                return;
            };

            let url = {
                let mut state = self.state.lock().await;
                if state.stop_requested {
                    return;
                }
                let Some(url) = state.next_admissible() else {
                    return;
                };
                state.in_flight.push(url.clone());
                self.save_snapshot(&state);
                url
            };

            let options = self.options.read().await.clone();
            let ctx = self.worker_context(url.clone(), options, cancel.clone());

            tracing::debug!(%url, "Admitting item");
            workers.spawn(async move {
                let _permit = permit;
                let outcome = AssertUnwindSafe(worker::run_item(ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| worker::panicked(&url));
                (url, outcome)
            });
        }
    }

    /// Record a finished item: history, stats, queue state, snapshot, events
    ///
    /// History is written before the item leaves `in_flight`, so a held-back copy of
    /// the same post finds the record once it is admitted.
    async fn settle(&self, url: String, outcome: ItemOutcome) {
        let persistence = self.persistence.clone();
        let recorded = outcome.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || record_outcome(&persistence, &recorded)).await
        {
            tracing::error!(%url, error = %e, "Recording outcome did not complete");
        }

        let (completed, total) = {
            let mut state = self.state.lock().await;

            if let Some(pos) = state.in_flight.iter().position(|u| *u == url) {
                state.in_flight.remove(pos);
            }
            state.completed += 1;
            if outcome.is_success() {
                state.succeeded += 1;
            } else {
                state.failed.push(url.clone());
            }

            self.save_snapshot(&state);
            (state.completed, state.total)
        };

        match outcome {
            ItemOutcome::Success(success) => match success.skipped {
                Some(reason) => self.emit_event(Event::ItemSkipped {
                    shortcode: success.shortcode,
                    reason,
                }),
                None => self.emit_event(Event::ItemComplete {
                    url,
                    shortcode: success.shortcode,
                    files: success.files,
                    size_bytes: success.bytes_downloaded,
                }),
            },
            ItemOutcome::Failed(failure) => self.emit_event(Event::ItemFailed {
                url,
                error: failure.reason,
            }),
        }

        tracing::debug!(completed, total, "Progress");
        self.emit_event(Event::Progress { completed, total });
    }

    /// Close out the run: final state, snapshot, summary, `Finished` event
    ///
    /// Returns `None` without finishing when items were queued after the last
    /// admission pass and no stop was requested.
    async fn finish_run(&self) -> Option<RunSummary> {
        let summary = {
            let mut state = self.state.lock().await;

            if !state.stop_requested && !state.pending.is_empty() {
                return None;
            }

            // Only reachable if a worker was aborted; keep the item rather than lose it
            if !state.in_flight.is_empty() {
                let stranded = std::mem::take(&mut state.in_flight);
                tracing::warn!(count = stranded.len(), "Items left in flight, marking failed");
                state.failed.extend(stranded);
            }

            let summary = RunSummary {
                completed: state.completed,
                succeeded: state.succeeded,
                failed: state.completed - state.succeeded,
                stopped: state.stop_requested,
            };

            if !summary.stopped && state.pending.is_empty() {
                self.persistence.snapshot.remove();
            } else {
                self.save_snapshot(&state);
            }

            state.run_state = RunState::Finished;
            self.summary_tx.send_replace(Some(summary));
            summary
        };

        tracing::info!(
            completed = summary.completed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            stopped = summary.stopped,
            "{}",
            summary.message()
        );
        self.emit_event(Event::Finished { summary });
        Some(summary)
    }
}

/// History and stats bookkeeping for one outcome
///
/// History gets a record for every outcome that has a shortcode, except history skips
/// and successes for a post that already has a successful record. Stats count every
/// outcome.
fn record_outcome(persistence: &Persistence, outcome: &ItemOutcome) {
    let history = &persistence.history;
    let stats = &persistence.stats;

    match outcome {
        ItemOutcome::Success(s) => {
            if s.skipped != Some(SkipReason::InHistory) && !history.exists(&s.shortcode) {
                history.append(HistoryRecord {
                    shortcode: s.shortcode.clone(),
                    url: s.url.clone(),
                    timestamp: chrono::Utc::now(),
                    success: true,
                    media_type: s.media_type,
                });
            }
            stats.update(
                true,
                s.bytes_downloaded as f64 / BYTES_PER_MB,
                s.elapsed.as_secs_f64(),
            );
        }
        ItemOutcome::Failed(f) => {
            if let Some(shortcode) = &f.shortcode {
                history.append(HistoryRecord {
                    shortcode: shortcode.clone(),
                    url: f.url.clone(),
                    timestamp: chrono::Utc::now(),
                    success: false,
                    media_type: f.media_type.unwrap_or(MediaType::Video),
                });
            }
            stats.update(false, 0.0, f.elapsed.as_secs_f64());
        }
    }
}
