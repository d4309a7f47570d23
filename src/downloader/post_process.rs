//! Post-processing of downloaded videos.
//!
//! Each step is independent and best-effort: a failure becomes a
//! `PostProcessWarning` event and never turns a successful download into a failure.

use crate::error::{Error, Result};
use crate::types::{Event, Shortcode};
use std::path::{Path, PathBuf};

use super::worker::{WorkerContext, stream_to_file};

const STEP_COMPRESS: &str = "compress";
const STEP_EXTRACT_AUDIO: &str = "extract_audio";
const STEP_THUMBNAIL: &str = "thumbnail";

/// Run the enabled post-processing steps on `video`
///
/// Returns the extra files written (audio track, thumbnail).
pub(crate) async fn post_process_video(
    ctx: &WorkerContext,
    shortcode: &Shortcode,
    video: &Path,
    thumbnail_url: Option<&str>,
) -> Vec<PathBuf> {
    let options = &ctx.options;
    let mut extra = Vec::new();

    if options.compress_video
        && let Err(e) = compress_in_place(ctx, video).await
    {
        warn(ctx, shortcode, STEP_COMPRESS, &e);
    }

    if options.extract_audio {
        let audio = video.with_extension("mp3");
        match ctx.transcoder.extract_audio(video, &audio).await {
            Ok(()) => {
                tracing::debug!(path = %audio.display(), "Audio extracted");
                extra.push(audio);
            }
            Err(e) => warn(ctx, shortcode, STEP_EXTRACT_AUDIO, &e),
        }
    }

    if options.download_thumbnails {
        let thumb = video.with_extension("jpg");
        let result = match thumbnail_url {
            Some(url) => stream_to_file(ctx, url, &thumb).await,
            None => Err(Error::NoDownloadableMedia {
                shortcode: shortcode.to_string(),
                reason: "post has no thumbnail URL".to_string(),
            }),
        };
        match result {
            Ok(_) => extra.push(thumb),
            Err(e) => warn(ctx, shortcode, STEP_THUMBNAIL, &e),
        }
    }

    extra
}

/// Re-encode `video` and atomically replace it with the result
async fn compress_in_place(ctx: &WorkerContext, video: &Path) -> Result<()> {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = video.with_file_name(format!("{}.compressing.mp4", stem));

    let result: Result<()> = async {
        ctx.transcoder
            .compress(video, &tmp, ctx.options.quality)
            .await?;
        tokio::fs::rename(&tmp, video).await?;
        Ok(())
    }
    .await;

    match &result {
        Ok(()) => {
            tracing::debug!(path = %video.display(), quality = ?ctx.options.quality, "Video compressed");
        }
        Err(_) => {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
    }
    result
}

fn warn(ctx: &WorkerContext, shortcode: &Shortcode, step: &str, error: &Error) {
    tracing::warn!(%shortcode, step, error = %error, "Post-processing step failed");
    ctx.emit(Event::PostProcessWarning {
        shortcode: shortcode.clone(),
        step: step.to_string(),
        message: error.to_string(),
    });
}
