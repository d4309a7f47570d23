//! Queue management: enqueueing, profile expansion, restore and read accessors.

use crate::config::DownloadOptions;
use crate::error::Result;
use crate::store::{HistoryStore, StatsAggregate};
use crate::types::{Event, QueueStats};
use crate::utils::{is_supported_url, parse_username, post_url};
use futures::StreamExt;

use super::ReelDownloader;

impl ReelDownloader {
    /// Add URLs to the pending queue
    ///
    /// Each entry is trimmed; entries that do not mention the supported domain are
    /// dropped. Duplicates are kept (history dedup happens at download time). Items
    /// added while a run is active are picked up by that run.
    ///
    /// Returns the number of URLs accepted.
    pub async fn enqueue<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let accepted: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty() && is_supported_url(u))
            .collect();

        if accepted.is_empty() {
            return 0;
        }

        let added = accepted.len();
        let queue_len = {
            let mut state = self.state.lock().await;
            state.pending.extend(accepted);
            if state.is_active() {
                state.total += added;
                // Wake the coordinator so free permits are filled now
                self.admit_notify.notify_one();
            }
            self.save_snapshot(&state);
            state.pending.len()
        };

        tracing::info!(added, queue_len, "URLs queued");
        self.emit_event(Event::Queued { added, queue_len });
        added
    }

    /// Queue posts from a profile
    ///
    /// Accepts a bare username or a profile URL. Videos are always taken, images only
    /// when `download_images` is on. `limit` caps the number of posts (0 = no cap).
    /// The profile stream is consumed lazily and dropped once the cap is reached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for an unusable username, or the client's error
    /// if the stream fails before yielding any post.
    pub async fn enqueue_profile(&self, user_or_url: &str, limit: usize) -> Result<usize> {
        let username = parse_username(user_or_url)?;
        let download_images = self.options.read().await.download_images;

        tracing::info!(%username, limit, "Fetching posts from profile");

        let mut urls = Vec::new();
        let mut posts = self.client.profile_posts(&username);
        while let Some(post) = posts.next().await {
            match post {
                Ok(post) => {
                    if post.is_wanted(download_images) {
                        urls.push(post_url(&post.shortcode));
                        if limit > 0 && urls.len() >= limit {
                            break;
                        }
                    }
                }
                Err(e) if urls.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        %username,
                        error = %e,
                        collected = urls.len(),
                        "Profile listing ended early"
                    );
                    break;
                }
            }
        }
        drop(posts);

        let added = self.enqueue(&urls).await;
        tracing::info!(%username, added, "Added posts from profile to queue");
        Ok(added)
    }

    /// Load the queue snapshot left by a previous session
    pub(crate) async fn restore_queue(&self) {
        let restored = self.persistence.snapshot.load();
        if restored.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        state.pending.extend(restored);
        self.save_snapshot(&state);
    }

    /// Current queue counters and run state
    pub async fn queue_stats(&self) -> QueueStats {
        self.state.lock().await.queue_stats()
    }

    /// Pending URLs in admission order
    pub async fn pending_items(&self) -> Vec<String> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    /// URLs whose last attempt failed
    pub async fn failed_items(&self) -> Vec<String> {
        self.state.lock().await.failed.clone()
    }

    /// The history log
    pub fn history(&self) -> &HistoryStore {
        &self.persistence.history
    }

    /// Copy of the aggregate statistics
    pub fn stats(&self) -> StatsAggregate {
        self.persistence.stats.summary()
    }

    /// Zero the aggregate statistics
    pub fn reset_stats(&self) {
        self.persistence.stats.reset();
    }

    /// Options that the next dispatched item will use
    pub async fn download_options(&self) -> DownloadOptions {
        self.options.read().await.clone()
    }

    /// Update download options at runtime
    ///
    /// Items already in flight keep the options they were dispatched with.
    pub async fn set_download_options(&self, options: DownloadOptions) {
        tracing::info!(?options, "Download options updated");
        *self.options.write().await = options;
    }

    /// Drop every pending URL; in-flight items are unaffected
    ///
    /// Returns the number of URLs removed.
    pub async fn clear_queue(&self) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.pending.len();
        state.pending.clear();
        self.save_snapshot(&state);
        tracing::info!(removed, "Pending queue cleared");
        removed
    }

    /// Forget the failed list
    ///
    /// Returns the number of URLs removed.
    pub async fn clear_failed(&self) -> usize {
        let mut state = self.state.lock().await;
        let removed = state.failed.len();
        state.failed.clear();
        removed
    }
}
