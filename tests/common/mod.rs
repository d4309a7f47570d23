//! Common test utilities for reel-dl end-to-end tests

use async_trait::async_trait;
use futures::stream::BoxStream;
use reel_dl::{Config, Error, Event, MediaDescriptor, MetadataClient, Result, Shortcode};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Body every media request answers with
pub const MEDIA_BODY: &[u8] = b"fake-video-bytes";

/// Metadata client backed by a media server, with a set of shortcodes that always fail
pub struct StaticClient {
    media_base: String,
    broken: Mutex<HashSet<String>>,
    profile: Vec<String>,
}

impl StaticClient {
    pub fn new(server: &MockServer) -> Self {
        Self {
            media_base: server.uri(),
            broken: Mutex::new(HashSet::new()),
            profile: Vec::new(),
        }
    }

    /// Shortcodes returned, newest first, for any profile
    pub fn with_profile(mut self, codes: &[&str]) -> Self {
        self.profile = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Make every lookup for `code` fail permanently
    pub fn break_post(&self, code: &str) {
        self.broken.lock().unwrap().insert(code.to_string());
    }

    /// Make lookups for `code` succeed again
    pub fn fix_post(&self, code: &str) {
        self.broken.lock().unwrap().remove(code);
    }

    fn descriptor(&self, code: &str) -> MediaDescriptor {
        MediaDescriptor {
            shortcode: Shortcode::new(code),
            is_video: true,
            video_url: Some(format!("{}/media/{}.mp4", self.media_base, code)),
            thumbnail_url: Some(format!("{}/media/{}.jpg", self.media_base, code)),
            owner_username: Some("creator".to_string()),
            ..MediaDescriptor::default()
        }
    }
}

#[async_trait]
impl MetadataClient for StaticClient {
    async fn fetch_post(&self, shortcode: &Shortcode) -> Result<MediaDescriptor> {
        if self.broken.lock().unwrap().contains(shortcode.as_str()) {
            return Err(Error::Client(format!("Post {} is private", shortcode)));
        }
        Ok(self.descriptor(shortcode.as_str()))
    }

    fn profile_posts(&self, _username: &str) -> BoxStream<'_, Result<MediaDescriptor>> {
        let posts: Vec<_> = self.profile.iter().map(|c| Ok(self.descriptor(c))).collect();
        Box::pin(futures::stream::iter(posts))
    }
}

/// Media server answering `/media/...` with [`MEDIA_BODY`] after `delay`
pub async fn media_server(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/media/.+"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(MEDIA_BODY.to_vec())
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

/// Config rooted in `dir` that never leaves localhost
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.min_free_space = 0;
    config.persistence.state_dir = dir.join("state");
    config.network.connectivity_check_url = None;
    config.rate_limit.max_requests = 1000;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(20);
    config.tools.ffmpeg_path = None;
    config.tools.search_path = false;
    config
}

pub fn reel(code: &str) -> String {
    format!("https://www.instagram.com/reel/{}/", code)
}

/// Collect events until `done` matches one, or `timeout` passes
pub async fn collect_events_until(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    done: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let finished = done(&event);
            seen.push(event);
            if finished {
                break;
            }
        }
    })
    .await;
    seen
}
