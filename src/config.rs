//! Configuration types for reel-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Download behavior configuration (destination, concurrency, disk checks)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "~/Downloads/InstagramReels", or "./downloads" without a home)
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Minimum free space required on the destination volume before a run starts
    /// (default: 100 MiB, 0 disables the check)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Maximum time to wait for a single chunk of a media stream (default: 30 seconds)
    #[serde(default = "default_chunk_timeout", with = "duration_serde")]
    pub chunk_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            min_free_space: default_min_free_space(),
            chunk_timeout: default_chunk_timeout(),
        }
    }
}

/// Per-item download options, snapshotted into each worker at dispatch time
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Download image posts (and image carousel children) as well as videos
    #[serde(default)]
    pub download_images: bool,

    /// Fetch the post thumbnail next to each downloaded video
    #[serde(default)]
    pub download_thumbnails: bool,

    /// Extract an mp3 audio track from each downloaded video
    #[serde(default)]
    pub extract_audio: bool,

    /// Re-encode downloaded videos to save space
    #[serde(default)]
    pub compress_video: bool,

    /// Quality tier used when compressing
    #[serde(default)]
    pub quality: QualityTier,

    /// Where downloaded files are placed under the download directory
    #[serde(default)]
    pub organization: OrganizationScheme,
}

/// Compression quality tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// Smallest files
    Low,
    /// Balanced size and quality (default)
    #[default]
    Medium,
    /// Near-source quality
    High,
}

impl QualityTier {
    /// x264 constant rate factor for this tier
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 32,
            QualityTier::Medium => 28,
            QualityTier::High => 23,
        }
    }

    /// AAC audio bitrate for this tier
    pub fn audio_bitrate(&self) -> &'static str {
        match self {
            QualityTier::Low => "96k",
            QualityTier::Medium => "128k",
            QualityTier::High => "192k",
        }
    }
}

/// Destination subdirectory policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationScheme {
    /// Everything directly in the download directory (default)
    #[default]
    Flat,
    /// One folder per post date (`YYYY-MM-DD`)
    ByDate,
    /// `videos/` and `images/`
    ByType,
    /// One folder per account
    ByUser,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per item, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Fixed wait after the remote service signals rate limiting (default: 60 seconds)
    #[serde(default = "default_rate_limit_cooldown", with = "millis_serde")]
    pub rate_limit_cooldown: Duration,

    /// Add random jitter to backoff delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            rate_limit_cooldown: default_rate_limit_cooldown(),
            jitter: false,
        }
    }
}

/// Client-side request rate limit (sliding window)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per window (default: 5)
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Window length (default: 60 seconds)
    #[serde(default = "default_window", with = "duration_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window: default_window(),
        }
    }
}

/// HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP connect timeout (default: 15 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with media requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// URL probed before a run starts (None skips the check)
    #[serde(default = "default_connectivity_check_url")]
    pub connectivity_check_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
            connectivity_check_url: default_connectivity_check_url(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// Where history, stats and the queue snapshot live
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding `history.json`, `stats.json` and `queue.json` (default: "./state")
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl PersistenceConfig {
    /// Path of the history log
    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join("history.json")
    }

    /// Path of the stats aggregate
    pub fn stats_path(&self) -> PathBuf {
        self.state_dir.join("stats.json")
    }

    /// Path of the queue snapshot
    pub fn queue_path(&self) -> PathBuf {
        self.state_dir.join("queue.json")
    }
}

/// Main configuration for ReelDownloader
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) - destination, concurrency, disk checks
/// - [`options`](DownloadOptions) - per-item toggles handed to each worker
/// - [`retry`](RetryConfig) - retry ceiling and delays
/// - [`rate_limit`](RateLimitConfig) - client-side admission window
/// - [`network`](NetworkConfig) - HTTP client settings
/// - [`tools`](ToolsConfig) - ffmpeg discovery
/// - [`persistence`](PersistenceConfig) - state file locations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Default per-item options
    #[serde(default)]
    pub options: DownloadOptions,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Client-side rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// HTTP client settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// External tool discovery
    #[serde(default)]
    pub tools: ToolsConfig,

    /// State file locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".to_string(),
                key: Some("max_concurrent_downloads".to_string()),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config {
                message: "max_attempts must be at least 1".to_string(),
                key: Some("max_attempts".to_string()),
            });
        }
        if self.rate_limit.max_requests == 0 {
            return Err(Error::Config {
                message: "max_requests must be at least 1".to_string(),
                key: Some("max_requests".to_string()),
            });
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    match std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        Some(home) => PathBuf::from(home).join("Downloads").join("InstagramReels"),
        None => PathBuf::from("./downloads"),
    }
}

fn default_max_concurrent() -> usize {
    3
}

fn default_min_free_space() -> u64 {
    100 * 1024 * 1024
}

fn default_chunk_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_rate_limit_cooldown() -> Duration {
    Duration::from_secs(60)
}

fn default_max_requests() -> usize {
    5
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_user_agent() -> String {
    format!("reel-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connectivity_check_url() -> Option<String> {
    Some("https://www.google.com/generate_204".to_string())
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for retry delays)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
