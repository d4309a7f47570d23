//! Fallback transcoder when ffmpeg is missing

use super::traits::{Transcoder, TranscoderCapabilities};
use crate::config::QualityTier;
use async_trait::async_trait;
use std::path::Path;

const HINT: &str = "ffmpeg not found. Set tools.ffmpeg_path or put ffmpeg in PATH.";

/// Transcoder that refuses every operation with `Error::ToolUnavailable`
///
/// Post-processing turns that error into a warning, so downloads still succeed
/// without ffmpeg installed.
pub struct NoOpTranscoder;

#[async_trait]
impl Transcoder for NoOpTranscoder {
    async fn compress(&self, _input: &Path, _output: &Path, _quality: QualityTier) -> crate::Result<()> {
        Err(crate::Error::ToolUnavailable(HINT.into()))
    }

    async fn extract_audio(&self, _input: &Path, _output: &Path) -> crate::Result<()> {
        Err(crate::Error::ToolUnavailable(HINT.into()))
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_compress: false,
            can_extract_audio: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_operation_reports_missing_tool() {
        let transcoder = NoOpTranscoder;
        let compress = transcoder
            .compress(Path::new("a.mp4"), Path::new("b.mp4"), QualityTier::High)
            .await;
        assert!(matches!(compress, Err(crate::Error::ToolUnavailable(_))));

        let audio = transcoder
            .extract_audio(Path::new("a.mp4"), Path::new("a.mp3"))
            .await;
        assert!(matches!(audio, Err(crate::Error::ToolUnavailable(_))));
    }
}
