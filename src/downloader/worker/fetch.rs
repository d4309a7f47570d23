//! One download attempt: rate gate, metadata, media selection, streaming to disk.

use crate::client::MediaDescriptor;
use crate::error::{Error, Result};
use crate::types::{MediaType, Shortcode};
use crate::utils::{destination_dir, partial_path};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;

use super::context::WorkerContext;

/// A file this item should produce
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MediaTarget {
    pub(crate) url: String,
    pub(crate) media_type: MediaType,
    /// File name without directory, e.g. `Cabc.mp4` or `Cabc_2.jpg`
    pub(crate) file_name: String,
    pub(crate) thumbnail_url: Option<String>,
}

/// A file present on disk after the attempt
#[derive(Debug, Clone)]
pub(crate) struct FetchedFile {
    pub(crate) path: PathBuf,
    pub(crate) media_type: MediaType,
    pub(crate) thumbnail_url: Option<String>,
    /// False when the final file was already there and nothing was fetched
    pub(crate) fetched: bool,
}

/// Result of a successful attempt
#[derive(Debug, Clone)]
pub(crate) struct FetchedPost {
    pub(crate) media_type: MediaType,
    pub(crate) files: Vec<FetchedFile>,
    pub(crate) bytes: u64,
}

impl FetchedPost {
    /// Whether every file already existed
    pub(crate) fn all_existing(&self) -> bool {
        self.files.iter().all(|f| !f.fetched)
    }
}

/// Decide which files to fetch for a post
///
/// Image nodes are only wanted with `download_images`. Carousel children are numbered
/// by their position in the carousel, starting at 1, whether or not they are wanted.
pub(crate) fn plan_targets(
    post: &MediaDescriptor,
    shortcode: &Shortcode,
    download_images: bool,
) -> Result<Vec<MediaTarget>> {
    let no_media = |reason: &str| Error::NoDownloadableMedia {
        shortcode: shortcode.to_string(),
        reason: reason.to_string(),
    };

    if post.is_carousel() {
        let targets: Vec<MediaTarget> = post
            .carousel
            .iter()
            .enumerate()
            .filter(|(_, child)| child.is_video || download_images)
            .filter_map(|(i, child)| {
                let media_type = child.media_type();
                child.media_url().map(|url| MediaTarget {
                    url: url.to_string(),
                    media_type,
                    file_name: format!("{}_{}.{}", shortcode, i + 1, media_type.extension()),
                    thumbnail_url: child.thumbnail().map(str::to_string),
                })
            })
            .collect();

        if targets.is_empty() {
            return Err(no_media(if download_images {
                "carousel has no media URLs"
            } else {
                "carousel has no videos and image downloads are disabled"
            }));
        }
        return Ok(targets);
    }

    if !post.is_video && !download_images {
        return Err(no_media("post is an image and image downloads are disabled"));
    }

    let media_type = post.media_type();
    let url = post.media_url().ok_or_else(|| {
        no_media(match media_type {
            MediaType::Video => "video URL missing",
            MediaType::Image => "image URL missing",
        })
    })?;

    Ok(vec![MediaTarget {
        url: url.to_string(),
        media_type,
        file_name: format!("{}.{}", shortcode, media_type.extension()),
        thumbnail_url: post.thumbnail().map(str::to_string),
    }])
}

/// Primary asset kind of a post; a carousel counts as video if any child is one
pub(crate) fn post_media_type(post: &MediaDescriptor) -> MediaType {
    if post.is_carousel() {
        if post.carousel.iter().any(|child| child.is_video) {
            MediaType::Video
        } else {
            MediaType::Image
        }
    } else {
        post.media_type()
    }
}

/// Run one attempt for `shortcode`
///
/// `resolved` receives the post's asset kind as soon as metadata is known, so a
/// failure later in the attempt can still report it.
pub(crate) async fn fetch_post(
    ctx: &WorkerContext,
    shortcode: &Shortcode,
    resolved: &OnceLock<MediaType>,
) -> Result<FetchedPost> {
    ctx.rate_limiter.wait_for_admission(&ctx.cancel).await?;

    let post = ctx.client.fetch_post(shortcode).await?;
    let _ = resolved.set(post_media_type(&post));
    let targets = plan_targets(&post, shortcode, ctx.options.download_images)?;

    let media_type = if targets.iter().any(|t| t.media_type == MediaType::Video) {
        MediaType::Video
    } else {
        MediaType::Image
    };

    let mut files = Vec::with_capacity(targets.len());
    let mut bytes = 0;
    for target in targets {
        let dir = destination_dir(
            &ctx.download_dir,
            ctx.options.organization,
            target.media_type,
            post.owner_username.as_deref(),
            post.taken_at,
        );
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&target.file_name);

        let fetched = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "File already exists, not fetching");
            false
        } else {
            bytes += stream_to_file(ctx, &target.url, &path).await?;
            true
        };

        files.push(FetchedFile {
            path,
            media_type: target.media_type,
            thumbnail_url: target.thumbnail_url,
            fetched,
        });
    }

    Ok(FetchedPost {
        media_type,
        files,
        bytes,
    })
}

/// Stream `url` into `final_path` through a temporary sibling
///
/// The final path only ever appears complete. On any failure (including a stop
/// request) the temporary file is removed.
pub(crate) async fn stream_to_file(ctx: &WorkerContext, url: &str, final_path: &Path) -> Result<u64> {
    let part = partial_path(final_path);

    let result: Result<u64> = async {
        let mut response = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(Error::Cancelled(format!("stopped while requesting {}", url)));
            }
            response = ctx.fetcher.get(url) => response?,
        };
        let mut file = tokio::fs::File::create(&part).await?;
        let mut written = 0u64;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("stopped while downloading {}", url)));
            }

            let chunk = tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("stopped while downloading {}", url)));
                }
                chunk = tokio::time::timeout(ctx.chunk_timeout, response.chunk()) => {
                    chunk.map_err(|_| {
                        Error::Timeout(format!(
                            "no data from {} for {}s",
                            url,
                            ctx.chunk_timeout.as_secs()
                        ))
                    })??
                }
            };

            match chunk {
                Some(bytes) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                None => break,
            }
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part, final_path).await?;
        Ok(written)
    }
    .await;

    match &result {
        Ok(written) => {
            tracing::debug!(path = %final_path.display(), bytes = written, "File written");
        }
        Err(e) => {
            tracing::debug!(url, error = %e, "Transfer failed, removing partial file");
            let _ = tokio::fs::remove_file(&part).await;
        }
    }
    result
}
