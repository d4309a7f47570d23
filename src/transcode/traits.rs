//! Transcoder trait and capability report

use crate::config::QualityTier;
use async_trait::async_trait;
use std::path::Path;

/// What a transcoder implementation can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscoderCapabilities {
    /// Can re-encode video at a quality tier
    pub can_compress: bool,
    /// Can extract an audio track
    pub can_extract_audio: bool,
}

/// Interface for video post-processing
///
/// Implementations write to `output` and leave `input` untouched; replacing the
/// original is the caller's business.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Re-encode `input` into `output` at the given quality
    ///
    /// # Errors
    ///
    /// [`Error::ToolUnavailable`](crate::Error::ToolUnavailable) when no tool is
    /// configured, [`Error::ExternalTool`](crate::Error::ExternalTool) when the tool
    /// fails to run or exits non-zero.
    async fn compress(&self, input: &Path, output: &Path, quality: QualityTier) -> crate::Result<()>;

    /// Extract the audio track of `input` into `output` (MP3)
    ///
    /// # Errors
    ///
    /// Same as [`Transcoder::compress`].
    async fn extract_audio(&self, input: &Path, output: &Path) -> crate::Result<()>;

    /// Query capabilities of this transcoder
    fn capabilities(&self) -> TranscoderCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
