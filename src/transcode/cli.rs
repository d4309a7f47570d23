//! ffmpeg-backed transcoder

use super::traits::{Transcoder, TranscoderCapabilities};
use crate::config::QualityTier;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Transcoder that runs the external `ffmpeg` binary
///
/// # Examples
///
/// ```no_run
/// use reel_dl::transcode::{FfmpegTranscoder, Transcoder};
/// use std::path::{Path, PathBuf};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ffmpeg = FfmpegTranscoder::new(PathBuf::from("/usr/bin/ffmpeg"));
/// ffmpeg.extract_audio(Path::new("clip.mp4"), Path::new("clip.mp3")).await?;
/// # Ok(())
/// # }
/// ```
pub struct FfmpegTranscoder {
    binary_path: PathBuf,
}

impl FfmpegTranscoder {
    /// Create a transcoder with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Look for `ffmpeg` in `PATH`
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Path of the binary this transcoder runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn run(&self, args: Vec<OsString>) -> crate::Result<()> {
        tracing::debug!(binary = %self.binary_path.display(), ?args, "running ffmpeg");

        let output = Command::new(&self.binary_path)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(crate::Error::ExternalTool(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                last_stderr_line(&output.stderr)
            )))
        }
    }
}

/// Arguments for re-encoding at a quality tier (H.264 + AAC)
pub(crate) fn compress_args(input: &Path, output: &Path, quality: QualityTier) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-c:v".into(),
        "libx264".into(),
        "-crf".into(),
        quality.crf().to_string().into(),
        "-preset".into(),
        "medium".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        quality.audio_bitrate().into(),
        output.into(),
    ]
}

/// Arguments for dropping video and writing an MP3 track
pub(crate) fn extract_audio_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-vn".into(),
        "-acodec".into(),
        "libmp3lame".into(),
        "-q:a".into(),
        "2".into(),
        output.into(),
    ]
}

/// ffmpeg prints its banner first; the useful diagnostic is at the end
fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_string()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn compress(&self, input: &Path, output: &Path, quality: QualityTier) -> crate::Result<()> {
        self.run(compress_args(input, output, quality)).await
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> crate::Result<()> {
        self.run(extract_audio_args(input, output)).await
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_compress: true,
            can_extract_audio: true,
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_compress_args_use_tier_crf() {
        let args = strings(compress_args(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            QualityTier::High,
        ));
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "23");
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(args.contains(&"192k".to_string()));
    }

    #[test]
    fn test_extract_audio_args_drop_video() {
        let args = strings(extract_audio_args(Path::new("in.mp4"), Path::new("in.mp3")));
        assert!(args.contains(&"-vn".to_string()));
        assert!(args.contains(&"libmp3lame".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("in.mp3"));
    }

    #[test]
    fn test_last_stderr_line_skips_trailing_blank_lines() {
        let stderr = b"ffmpeg version 6.0\nin.mp4: No such file or directory\n\n";
        assert_eq!(last_stderr_line(stderr), "in.mp4: No such file or directory");
        assert_eq!(last_stderr_line(b""), "no output");
    }

    #[test]
    fn test_from_path_consistent_with_which() {
        assert_eq!(
            which::which("ffmpeg").is_ok(),
            FfmpegTranscoder::from_path().is_some()
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_external_tool_error() {
        let transcoder = FfmpegTranscoder::new(PathBuf::from("/nonexistent/ffmpeg-xyz"));
        let result = transcoder
            .extract_audio(Path::new("a.mp4"), Path::new("a.mp3"))
            .await;
        assert!(matches!(result, Err(crate::Error::ExternalTool(_))));
    }

    #[tokio::test]
    #[ignore] // Requires ffmpeg in PATH
    async fn test_compress_nonexistent_input_fails() {
        let Some(transcoder) = FfmpegTranscoder::from_path() else {
            return;
        };
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = transcoder
            .compress(
                &temp_dir.path().join("missing.mp4"),
                &temp_dir.path().join("out.mp4"),
                QualityTier::Low,
            )
            .await;
        assert!(result.is_err());
    }
}
