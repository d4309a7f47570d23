//! Video transcoding through an external tool
//!
//! Post-processing (compression and audio extraction) goes through the [`Transcoder`]
//! trait so the downloader never shells out directly.
//!
//! - [`FfmpegTranscoder`]: runs the `ffmpeg` binary
//! - [`NoOpTranscoder`]: used when no binary is found; every operation reports
//!   [`Error::ToolUnavailable`](crate::Error::ToolUnavailable)
//!
//! ```no_run
//! use reel_dl::transcode::{FfmpegTranscoder, Transcoder};
//! use reel_dl::config::QualityTier;
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ffmpeg = FfmpegTranscoder::from_path().expect("ffmpeg not in PATH");
//! ffmpeg
//!     .compress(Path::new("in.mp4"), Path::new("out.mp4"), QualityTier::Medium)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod cli;
mod noop;
mod traits;

pub use cli::FfmpegTranscoder;
pub use noop::NoOpTranscoder;
pub use traits::{Transcoder, TranscoderCapabilities};

use crate::config::ToolsConfig;
use std::sync::Arc;

/// Pick a transcoder from configuration
///
/// An explicit `ffmpeg_path` wins; otherwise `PATH` is searched when allowed.
pub fn detect(config: &ToolsConfig) -> Arc<dyn Transcoder> {
    if let Some(path) = &config.ffmpeg_path {
        return Arc::new(FfmpegTranscoder::new(path.clone()));
    }
    if config.search_path
        && let Some(ffmpeg) = FfmpegTranscoder::from_path()
    {
        return Arc::new(ffmpeg);
    }
    Arc::new(NoOpTranscoder)
}
