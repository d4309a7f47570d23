//! Metadata resolution and raw HTTP transfer
//!
//! Resolving a shortcode into media URLs is delegated to a [`MetadataClient`] supplied
//! by the embedder; the library ships no scraping logic. Bytes are fetched with
//! [`HttpFetcher`], a thin wrapper around a configured `reqwest::Client` that turns
//! status codes into typed errors the retry policy understands.

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::types::{MediaType, Shortcode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Everything the downloader needs to know about one post
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Post identifier
    pub shortcode: Shortcode,
    /// Whether the post (or this carousel child) is a video
    pub is_video: bool,
    /// Direct video URL, present for videos
    pub video_url: Option<String>,
    /// Direct image URL (for videos this is the poster frame)
    pub image_url: Option<String>,
    /// Thumbnail URL, used by the thumbnail post-processing step
    pub thumbnail_url: Option<String>,
    /// Like count at fetch time
    pub like_count: Option<u64>,
    /// Account that posted it
    pub owner_username: Option<String>,
    /// When the post was published
    pub taken_at: Option<DateTime<Utc>>,
    /// Children of a carousel post, empty otherwise
    #[serde(default)]
    pub carousel: Vec<MediaDescriptor>,
}

impl MediaDescriptor {
    /// Media type of this node
    pub fn media_type(&self) -> MediaType {
        if self.is_video {
            MediaType::Video
        } else {
            MediaType::Image
        }
    }

    /// URL of the primary media for this node (video for videos, image otherwise)
    pub fn media_url(&self) -> Option<&str> {
        if self.is_video {
            self.video_url.as_deref()
        } else {
            self.image_url.as_deref()
        }
    }

    /// Whether this is a carousel post
    pub fn is_carousel(&self) -> bool {
        !self.carousel.is_empty()
    }

    /// Whether a download with these settings would produce anything
    pub fn is_wanted(&self, download_images: bool) -> bool {
        if self.is_carousel() {
            self.carousel.iter().any(|c| c.is_wanted(download_images))
        } else {
            self.is_video || download_images
        }
    }

    /// Poster thumbnail URL, falling back to the image URL
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail_url.as_deref().or(self.image_url.as_deref())
    }
}

/// Source of post metadata
///
/// Implementations wrap whatever API or scraper the embedder uses. Errors should be
/// mapped onto [`Error`] so the retry policy can classify them: throttling as
/// [`Error::RateLimited`], everything else as [`Error::Client`] with the upstream
/// message (the policy also recognises `429` or "rate limit" inside that message).
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Resolve a post
    async fn fetch_post(&self, shortcode: &Shortcode) -> Result<MediaDescriptor>;

    /// Lazily enumerate a profile's posts, newest first
    fn profile_posts(&self, username: &str) -> BoxStream<'_, Result<MediaDescriptor>>;
}

/// Client used when the embedder has not configured one
///
/// Every call fails with [`Error::NotSupported`], so items fail cleanly instead of
/// hanging.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClient;

#[async_trait]
impl MetadataClient for UnconfiguredClient {
    async fn fetch_post(&self, shortcode: &Shortcode) -> Result<MediaDescriptor> {
        Err(Error::NotSupported(format!(
            "no metadata client configured, cannot resolve {}",
            shortcode
        )))
    }

    fn profile_posts(&self, username: &str) -> BoxStream<'_, Result<MediaDescriptor>> {
        let err = Error::NotSupported(format!(
            "no metadata client configured, cannot list posts of {}",
            username
        ));
        Box::pin(futures::stream::once(async move { Err(err) }))
    }
}

/// HTTP client for media bytes and the connectivity probe
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher from network settings
    ///
    /// No overall request timeout is set: bodies are streamed and each chunk is
    /// bounded by the caller instead.
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Issue a GET and check the status
    ///
    /// # Errors
    ///
    /// [`Error::RateLimited`] for 429, [`Error::HttpStatus`] for any other non-2xx,
    /// [`Error::Network`] when the request itself fails.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(format!("HTTP 429 from {}", url)));
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Check that `url` answers at all
    ///
    /// Any HTTP response counts as reachable; only transport failures do not.
    pub async fn check_connectivity(&self, url: &str) -> Result<()> {
        match self.client.get(url).send().await {
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "connectivity check passed");
                Ok(())
            }
            Err(e) => Err(Error::Unreachable(format!("{}: {}", url, e))),
        }
    }
}
