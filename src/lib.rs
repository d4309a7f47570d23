//! # reel-dl
//!
//! Library backend for batch-downloading short-form videos (and optionally images)
//! from Instagram post URLs.
//!
//! ## Design Philosophy
//!
//! reel-dl is designed to be:
//! - **Embeddable** - No CLI or UI; a front end drives it through async calls
//! - **Event-driven** - Consumers subscribe to events instead of polling
//! - **Restart-safe** - Queue, history and statistics persist as JSON files
//! - **Polite** - A shared sliding-window rate limiter and a retry policy that backs off
//!   on throttling
//!
//! Resolving a post into media URLs is the job of a [`MetadataClient`] supplied by the
//! embedder.
//!
//! ## Quick Start
//!
//! ```no_run
//! use reel_dl::{Config, ReelDownloader, UnconfiguredClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = ReelDownloader::new(Config::default(), Arc::new(UnconfiguredClient)).await?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     downloader
//!         .enqueue(["https://www.instagram.com/reel/Cabc123/"])
//!         .await;
//!     let summary = downloader.start().await?.await?;
//!     println!("{}", summary.message());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Metadata client trait and HTTP fetcher
pub mod client;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Sliding-window request rate limiting
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// JSON-file persistence (history, stats, queue snapshot)
pub mod store;
/// Video post-processing through ffmpeg
pub mod transcode;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::{HttpFetcher, MediaDescriptor, MetadataClient, UnconfiguredClient};
pub use config::{Config, DownloadOptions, OrganizationScheme, QualityTier};
pub use downloader::ReelDownloader;
pub use error::{Error, Result};
pub use store::{HistoryStore, StatsAggregate};
pub use transcode::{FfmpegTranscoder, NoOpTranscoder, Transcoder, TranscoderCapabilities};
pub use types::{
    Event, HistoryRecord, ItemOutcome, MediaType, QueueStats, RunState, RunSummary, Shortcode,
    SkipReason,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal, then stops the current run and writes a final queue
/// snapshot via [`ReelDownloader::shutdown`].
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use reel_dl::{Config, ReelDownloader, UnconfiguredClient, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = ReelDownloader::new(config, Arc::new(UnconfiguredClient)).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: ReelDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
