//! URL parsing, destination layout and disk helpers

use crate::config::OrganizationScheme;
use crate::error::{Error, Result};
use crate::types::{MediaType, Shortcode};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Substring a URL must contain to be accepted into the queue
pub const DOMAIN_MARKER: &str = "instagram.com";

/// Suffix of in-progress downloads, next to the final file
pub const PARTIAL_SUFFIX: &str = "part";

#[allow(clippy::expect_used)]
static SHORTCODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(?:reels?|p|s|tv)/([A-Za-z0-9_-]+)").expect("shortcode pattern is valid")
});

/// Path segments that are never usernames
const RESERVED_PROFILE_SEGMENTS: &[&str] = &["p", "reel", "reels", "s", "tv", "stories", "explore"];

/// Extract the shortcode from a post URL
///
/// Recognizes `/reel/<id>`, `/reels/<id>`, `/p/<id>`, `/s/<id>` and `/tv/<id>`.
///
/// # Examples
///
/// ```
/// use reel_dl::utils::extract_shortcode;
///
/// let code = extract_shortcode("https://www.instagram.com/reel/C5xYz_12-a/?igsh=abc").unwrap();
/// assert_eq!(code.as_str(), "C5xYz_12-a");
/// assert!(extract_shortcode("https://www.instagram.com/someuser/").is_none());
/// ```
#[must_use]
pub fn extract_shortcode(url: &str) -> Option<Shortcode> {
    SHORTCODE_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| Shortcode::new(m.as_str()))
}

/// Whether a line is worth queueing (contains the service's domain)
#[must_use]
pub fn is_supported_url(url: &str) -> bool {
    url.contains(DOMAIN_MARKER)
}

/// Canonical post URL for a shortcode
#[must_use]
pub fn post_url(shortcode: &Shortcode) -> String {
    format!("https://www.instagram.com/p/{}/", shortcode)
}

/// Turn a username or profile URL into a bare username
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] for empty input or a URL without a profile segment.
pub fn parse_username(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_start_matches('@');
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty username".to_string()));
    }

    if !is_supported_url(trimmed) {
        return Ok(trimmed.to_string());
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = url::Url::parse(&with_scheme)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", input, e)))?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .filter(|s| !RESERVED_PROFILE_SEGMENTS.contains(s))
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidUrl(format!("no username in {}", input)))
}

/// Replace characters that are unsafe in a single path component
#[must_use]
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Directory a downloaded item goes into under `base`
///
/// - `Flat`: `base`
/// - `ByDate`: `base/YYYY-MM-DD` of the post (today if unknown)
/// - `ByType`: `base/videos` or `base/images`
/// - `ByUser`: `base/<owner>` (`unknown` if the owner is not known)
#[must_use]
pub fn destination_dir(
    base: &Path,
    scheme: OrganizationScheme,
    media_type: MediaType,
    owner: Option<&str>,
    taken_at: Option<DateTime<Utc>>,
) -> PathBuf {
    match scheme {
        OrganizationScheme::Flat => base.to_path_buf(),
        OrganizationScheme::ByDate => {
            let date = taken_at.unwrap_or_else(Utc::now);
            base.join(date.format("%Y-%m-%d").to_string())
        }
        OrganizationScheme::ByType => base.join(media_type.folder_name()),
        OrganizationScheme::ByUser => base.join(sanitize_component(owner.unwrap_or("unknown"))),
    }
}

/// Temporary path a file is streamed into before the final rename
#[must_use]
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    final_path.with_file_name(name)
}

/// Create `dir` if needed and prove it is writable
///
/// # Errors
///
/// Returns [`Error::DestinationUnavailable`] if the directory cannot be created or written.
pub async fn ensure_writable_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::DestinationUnavailable {
            path: dir.to_path_buf(),
            reason: format!("cannot create directory: {}", e),
        })?;

    let probe = dir.join(format!(".reel-dl-write-test-{}", std::process::id()));
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| Error::DestinationUnavailable {
            path: dir.to_path_buf(),
            reason: format!("directory is not writable: {}", e),
        })?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

/// Fail if the volume holding `dir` has less than `required` bytes free
///
/// A `required` of zero disables the check. If free space cannot be determined the check
/// is skipped with a warning.
pub fn check_free_space(dir: &Path, required: u64) -> Result<()> {
    if required == 0 {
        return Ok(());
    }
    match get_available_space(dir) {
        Ok(available) if available < required => {
            Err(Error::InsufficientSpace { required, available })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "could not determine free space, skipping check");
            Ok(())
        }
    }
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized and
        // only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is what unprivileged users may use
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out-pointer refers to a live u64.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
