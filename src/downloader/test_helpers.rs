//! Shared test helpers for creating ReelDownloader instances in tests.

use crate::client::{MediaDescriptor, MetadataClient};
use crate::config::{Config, QualityTier};
use crate::downloader::ReelDownloader;
use crate::error::{Error, Result};
use crate::transcode::{Transcoder, TranscoderCapabilities};
use crate::types::{Event, Shortcode};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Body served for every media request
pub(crate) const MEDIA_BODY: &[u8] = b"not-really-an-mp4-but-close-enough";

/// Scripted reply for one `fetch_post` call
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    /// Resolve to this descriptor
    Post(MediaDescriptor),
    /// Fail with `Error::Client(message)`
    Fail(String),
}

/// Scriptable metadata client
///
/// Unknown shortcodes resolve to a video served by the mock media server at
/// `/media/<shortcode>.mp4`. Scripted replies are consumed in order; once a script
/// is exhausted the default applies again.
pub(crate) struct MockClient {
    media_base: String,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    profile: Mutex<Vec<MediaDescriptor>>,
    /// How long each `fetch_post` takes
    latency: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockClient {
    pub(crate) fn new(media_base: &str) -> Self {
        Self {
            media_base: media_base.to_string(),
            scripts: Mutex::new(HashMap::new()),
            profile: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a reply for `shortcode`
    pub(crate) fn script(&self, shortcode: &str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(shortcode.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Make the first `times` calls for `shortcode` fail with `message`
    pub(crate) fn fail_times(&self, shortcode: &str, times: usize, message: &str) {
        for _ in 0..times {
            self.script(shortcode, Reply::Fail(message.to_string()));
        }
    }

    pub(crate) fn set_profile(&self, posts: Vec<MediaDescriptor>) {
        *self.profile.lock().unwrap() = posts;
    }

    /// Default descriptor for a video post
    pub(crate) fn video(&self, code: &str) -> MediaDescriptor {
        MediaDescriptor {
            shortcode: Shortcode::new(code),
            is_video: true,
            video_url: Some(format!("{}/media/{}.mp4", self.media_base, code)),
            image_url: Some(format!("{}/media/{}.jpg", self.media_base, code)),
            thumbnail_url: Some(format!("{}/media/{}_thumb.jpg", self.media_base, code)),
            owner_username: Some("someone".to_string()),
            ..MediaDescriptor::default()
        }
    }

    /// Descriptor for an image post
    pub(crate) fn image(&self, code: &str) -> MediaDescriptor {
        MediaDescriptor {
            shortcode: Shortcode::new(code),
            is_video: false,
            image_url: Some(format!("{}/media/{}.jpg", self.media_base, code)),
            owner_username: Some("someone".to_string()),
            ..MediaDescriptor::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `fetch_post` calls observed at once
    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataClient for MockClient {
    async fn fetch_post(&self, shortcode: &Shortcode) -> Result<MediaDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(shortcode.as_str())
            .and_then(|replies| replies.pop_front());

        self.active.fetch_sub(1, Ordering::SeqCst);

        match scripted {
            Some(Reply::Post(post)) => Ok(post),
            Some(Reply::Fail(message)) => Err(Error::Client(message)),
            None => Ok(self.video(shortcode.as_str())),
        }
    }

    fn profile_posts(&self, _username: &str) -> BoxStream<'_, Result<MediaDescriptor>> {
        let posts = self.profile.lock().unwrap().clone();
        Box::pin(futures::stream::iter(posts.into_iter().map(Ok)))
    }
}

/// Transcoder that copies files instead of running ffmpeg
pub(crate) struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn compress(&self, input: &Path, output: &Path, quality: QualityTier) -> Result<()> {
        let mut data = tokio::fs::read(input).await?;
        data.extend_from_slice(format!("-crf{}", quality.crf()).as_bytes());
        tokio::fs::write(output, data).await?;
        Ok(())
    }

    async fn extract_audio(&self, _input: &Path, output: &Path) -> Result<()> {
        tokio::fs::write(output, b"audio").await?;
        Ok(())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_compress: true,
            can_extract_audio: true,
        }
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Start a media server answering every `/media/...` request with [`MEDIA_BODY`]
pub(crate) async fn media_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/media/.+"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(MEDIA_BODY.to_vec()))
        .mount(&server)
        .await;
    server
}

/// Config rooted in `dir` with fast retries, a generous rate limit and no network probe
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.max_concurrent_downloads = 3;
    config.download.min_free_space = 0;
    config.download.chunk_timeout = Duration::from_secs(5);
    config.persistence.state_dir = dir.join("state");
    config.network.connectivity_check_url = None;
    config.rate_limit.max_requests = 1000;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.rate_limit_cooldown = Duration::from_millis(30);
    config.tools.ffmpeg_path = None;
    config.tools.search_path = false;
    config
}

/// Helper to create a test ReelDownloader with its own temp dir and media server.
/// Returns the downloader, the client, the server and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader()
-> (ReelDownloader, Arc<MockClient>, MockServer, TempDir) {
    create_test_downloader_with(|_| {}, |client| client).await
}

/// Like [`create_test_downloader`] with hooks to adjust the config and the client
pub(crate) async fn create_test_downloader_with(
    configure: impl FnOnce(&mut Config),
    build_client: impl FnOnce(MockClient) -> MockClient,
) -> (ReelDownloader, Arc<MockClient>, MockServer, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let server = media_server().await;
    let client = Arc::new(build_client(MockClient::new(&server.uri())));

    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let downloader = ReelDownloader::new(config, client.clone()).await.unwrap();
    (downloader, client, server, temp_dir)
}

/// Canonical reel URL for a shortcode
pub(crate) fn reel(code: &str) -> String {
    format!("https://www.instagram.com/reel/{}/", code)
}

/// Drain every event currently buffered in `rx`
pub(crate) fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Number of requests the media server has received
pub(crate) async fn media_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|r| r.len())
        .unwrap_or(0)
}
