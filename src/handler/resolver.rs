//! Request path resolution and index fallback
//!
//! Turns a request URL into an absolute path beneath the root and decides
//! what that path stands for: a file, a directory without an index, or a
//! miss.

use percent_encoding::percent_decode_str;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::ServeError;

/// Index file suffixes probed for directory requests, in priority order
pub const INDEX_EXTENSIONS: [&str; 8] = ["html", "htm", "gif", "jpg", "jpeg", "png", "svg", "xml"];

/// The one absent path answered with `204 No Content` instead of `404`
pub const SOFT_MISS_PATH: &str = "/favicon.ico";

/// Where a request path points on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Path component of the URL with dot segments removed, still
    /// percent-encoded
    pub request_path: String,
    /// `root` joined with the decoded, dot-segment free request path
    pub absolute_path: PathBuf,
}

/// What the target turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A file to stream, either requested directly or found by index fallback
    File(PathBuf),
    /// A directory with no index candidate. Served as-is, which fails while
    /// streaming.
    Directory(PathBuf),
    SoftMiss,
    HardMiss,
}

/// Compute the on-disk target of `url`.
///
/// `url` is parsed against `http://localhost:<port>` so origin-form and
/// absolute-form request targets are handled alike. Query and fragment are
/// ignored.
pub fn target(root: &Path, port: u16, url: &str) -> Result<Target, ServeError> {
    let raw_path = url_path(port, url)?;
    let request_path = normalize_request_path(&raw_path);

    let decoded = percent_decode_str(&raw_path)
        .decode_utf8()
        .map_err(|_| ServeError::MalformedUrl(url.to_string()))?;
    if decoded.contains('\0') {
        return Err(ServeError::MalformedUrl(url.to_string()));
    }

    let absolute_path = remove_dot_segments(&decoded)
        .into_iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));

    Ok(Target {
        request_path,
        absolute_path,
    })
}

fn url_path(port: u16, url: &str) -> Result<String, ServeError> {
    let absolute = if url.starts_with('/') {
        format!("http://localhost:{port}{url}")
    } else if url.contains("://") {
        url.to_string()
    } else {
        format!("http://localhost:{port}/{url}")
    };

    let uri: hyper::Uri = absolute
        .parse()
        .map_err(|e| ServeError::MalformedUrl(format!("{url}: {e}")))?;
    Ok(uri.path().to_string())
}

/// Remove dot segments from a still-encoded path the way a URL parser does:
/// `%2e` counts as a dot, empty segments are kept and a trailing dot segment
/// leaves a trailing slash.
fn normalize_request_path(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let mut segments = path.strip_prefix('/').unwrap_or(path).split('/').peekable();

    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        if is_double_dot(segment) {
            output.pop();
        } else if !is_single_dot(segment) {
            output.push(segment);
            continue;
        }
        if last {
            output.push("");
        }
    }

    format!("/{}", output.join("/"))
}

fn is_single_dot(segment: &str) -> bool {
    segment == "." || segment.eq_ignore_ascii_case("%2e")
}

fn is_double_dot(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        ".." | ".%2e" | "%2e." | "%2e%2e"
    )
}

/// Drop `.` and empty segments, let `..` remove its parent. `..` never
/// climbs above the first segment.
fn remove_dot_segments(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments
}

/// Decide what `target` is on disk, probing index files for directories
pub async fn locate(target: &Target) -> Result<Resolution, ServeError> {
    let path = &target.absolute_path;

    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(match find_index(path).await {
            Some(index) => Resolution::File(index),
            None => Resolution::Directory(path.clone()),
        }),
        Ok(_) => Ok(Resolution::File(path.clone())),
        Err(e) if is_absent(&e) => {
            if target.request_path == SOFT_MISS_PATH {
                Ok(Resolution::SoftMiss)
            } else {
                Ok(Resolution::HardMiss)
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// First `index.<ext>` in `dir` that is a regular file
async fn find_index(dir: &Path) -> Option<PathBuf> {
    for ext in INDEX_EXTENSIONS {
        let candidate = dir.join(format!("index.{ext}"));
        if let Ok(meta) = fs::metadata(&candidate).await {
            if meta.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
