//! Per-item download execution.
//!
//! A worker takes one queue URL to a terminal [`ItemOutcome`]:
//! resolve the shortcode, skip it if history already has it, then run
//! rate gate → metadata → media transfer under the retry policy, and finally
//! post-process any video it wrote. Workers never touch the queue state; the
//! coordinator settles the outcome.

mod context;
mod fetch;

pub(crate) use context::WorkerContext;
pub(crate) use fetch::stream_to_file;

use crate::error::Error;
use crate::retry::download_with_retry;
use crate::types::{Event, ItemFailure, ItemOutcome, ItemSuccess, MediaType, SkipReason};
use crate::utils::extract_shortcode;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;

use super::post_process::post_process_video;

/// Process one item to completion
pub(crate) async fn run_item(ctx: WorkerContext) -> ItemOutcome {
    let started = Instant::now();
    ctx.emit(Event::ItemStarted {
        url: ctx.url.clone(),
    });

    let Some(shortcode) = extract_shortcode(&ctx.url) else {
        tracing::warn!(url = %ctx.url, "Invalid URL, no shortcode found");
        return ItemOutcome::Failed(ItemFailure {
            url: ctx.url.clone(),
            shortcode: None,
            media_type: None,
            reason: Error::InvalidUrl(ctx.url.clone()).to_string(),
            attempts: 0,
            cancelled: false,
            elapsed: started.elapsed(),
        });
    };

    if ctx.history.exists(&shortcode) {
        tracing::info!(%shortcode, "Already downloaded, skipping");
        return ItemOutcome::Success(ItemSuccess {
            url: ctx.url.clone(),
            shortcode,
            media_type: MediaType::Video,
            files: Vec::new(),
            bytes_downloaded: 0,
            elapsed: started.elapsed(),
            skipped: Some(SkipReason::InHistory),
        });
    }

    tracing::info!(%shortcode, "Downloading");

    let attempts = AtomicU32::new(0);
    let resolved = OnceLock::new();
    let result = download_with_retry(
        &ctx.retry,
        &ctx.cancel,
        |attempt, delay, error: &Error| {
            ctx.emit(Event::Retrying {
                url: ctx.url.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });
        },
        |attempt| {
            attempts.store(attempt, Ordering::Relaxed);
            fetch::fetch_post(&ctx, &shortcode, &resolved)
        },
    )
    .await;
    let attempts = attempts.load(Ordering::Relaxed);

    match result {
        Ok(post) => {
            let skipped = post.all_existing().then_some(SkipReason::FileExists);
            let mut files = Vec::with_capacity(post.files.len());

            for file in &post.files {
                files.push(file.path.clone());
                if file.fetched && file.media_type == MediaType::Video {
                    let extra = post_process_video(
                        &ctx,
                        &shortcode,
                        &file.path,
                        file.thumbnail_url.as_deref(),
                    )
                    .await;
                    files.extend(extra);
                }
            }

            tracing::info!(
                %shortcode,
                files = files.len(),
                bytes = post.bytes,
                attempts,
                "Download complete"
            );
            ItemOutcome::Success(ItemSuccess {
                url: ctx.url.clone(),
                shortcode,
                media_type: post.media_type,
                files,
                bytes_downloaded: post.bytes,
                elapsed: started.elapsed(),
                skipped,
            })
        }
        Err(e) => {
            let cancelled = e.is_cancelled() || ctx.cancel.is_cancelled();
            if cancelled {
                tracing::info!(%shortcode, error = %e, "Download stopped");
            } else {
                tracing::error!(%shortcode, error = %e, attempts, "Download failed");
            }
            ItemOutcome::Failed(ItemFailure {
                url: ctx.url.clone(),
                shortcode: Some(shortcode),
                media_type: resolved.get().copied(),
                reason: e.to_string(),
                attempts,
                cancelled,
                elapsed: started.elapsed(),
            })
        }
    }
}

/// Outcome for a worker task that panicked
pub(crate) fn panicked(url: &str) -> ItemOutcome {
    tracing::error!(url, "Worker task panicked");
    ItemOutcome::Failed(ItemFailure {
        url: url.to_string(),
        shortcode: extract_shortcode(url),
        media_type: None,
        reason: "worker task panicked".to_string(),
        attempts: 0,
        cancelled: false,
        elapsed: std::time::Duration::ZERO,
    })
}
