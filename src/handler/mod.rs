//! Request handler module
//!
//! Entry point for every request regardless of transport. The response is
//! produced by a spawned task writing through a [`Responder`], so the file
//! copy runs at the pace of the connection.
//!
//! [`Responder`]: crate::http::Responder

pub mod resolver;
pub mod static_files;

use hyper::{Request, Response, StatusCode, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppState;
use crate::http::response::{self, ResponseBody};
use crate::logger::{self, AccessLogEntry};

/// Per-request state, discarded when the response ends
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub url: String,
    /// Empty until the URL has been resolved
    pub absolute_path: PathBuf,
    pub content_type: Option<String>,
}

impl RequestContext {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    remote_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let url = req.uri().to_string();
    let mut entry = access_entry(&req, remote_addr);

    let (responder, head) = response::channel();
    tokio::spawn(async move {
        let summary = static_files::serve(&url, &state, responder).await;

        let logging = &state.config.logging;
        if logging.access_log {
            entry.status = summary.status.as_u16();
            entry.body_bytes = summary.body_bytes;
            entry.request_time_us =
                u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            logger::log_access(&entry, &logging.access_log_format);
        }
    });

    match head.await {
        Ok(resp) => Ok(resp),
        Err(_) => {
            logger::log_error("Request task ended without writing a status");
            let mut resp = Response::new(response::empty_body());
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            Ok(resp)
        }
    }
}

fn access_entry<B>(req: &Request<B>, remote_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        remote_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = version_label(req.version()).to_string();
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
