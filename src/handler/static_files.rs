//! Static file serving module
//!
//! Drives one request from resolution to a finalized response: picks the
//! status, sets Content-Type, streams the file in chunks and renders any
//! failure into the body.

use bytes::BytesMut;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::AppState;
use crate::error::ServeError;
use crate::handler::resolver::{self, Resolution};
use crate::handler::RequestContext;
use crate::http::Responder;
use crate::logger;

/// Bytes read from the file per body chunk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// What was sent, for the access log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    pub status: StatusCode,
    pub body_bytes: u64,
}

/// Answer the request for `url` and finalize `responder`.
///
/// Faults never escape: they are logged and appended to the body as an
/// HTML fragment, after whatever status was already written.
pub async fn serve<R>(url: &str, state: &AppState, mut responder: R) -> ServeSummary
where
    R: Responder + Send,
{
    let mut ctx = RequestContext::new(url);

    if let Err(err) = respond(&mut ctx, state, &mut responder).await {
        render_error(&ctx, &err, &mut responder).await;
    }

    let summary = ServeSummary {
        status: responder.status().unwrap_or(StatusCode::OK),
        body_bytes: responder.bytes_written(),
    };
    responder.end();
    summary
}

async fn respond<R>(
    ctx: &mut RequestContext,
    state: &AppState,
    responder: &mut R,
) -> Result<(), ServeError>
where
    R: Responder + Send,
{
    let target = resolver::target(&state.root, state.config.server.port, &ctx.url)?;
    ctx.absolute_path.clone_from(&target.absolute_path);

    match resolver::locate(&target).await? {
        Resolution::File(path) | Resolution::Directory(path) => {
            ctx.absolute_path = path;
            stream_file(ctx, state, responder).await
        }
        Resolution::SoftMiss => {
            responder.write_head(StatusCode::NO_CONTENT);
            Ok(())
        }
        Resolution::HardMiss => {
            responder.write_head(StatusCode::NOT_FOUND);
            Err(ServeError::NotFound)
        }
    }
}

async fn stream_file<R>(
    ctx: &mut RequestContext,
    state: &AppState,
    responder: &mut R,
) -> Result<(), ServeError>
where
    R: Responder + Send,
{
    let file_name = ctx
        .absolute_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    ctx.content_type = state.content_types.content_type(file_name);

    match ctx.content_type.as_deref().map(HeaderValue::from_str) {
        Some(Ok(value)) => responder.set_header(CONTENT_TYPE, value),
        _ => logger::log_note(&format!("No Content-Type found for {}", ctx.url)),
    }

    responder.write_head(StatusCode::OK);

    let mut file = File::open(&ctx.absolute_path).await?;
    copy_chunks(&mut file, responder).await
}

/// Copy `file` into the body until EOF. Stops at the first failed write.
async fn copy_chunks<R>(file: &mut File, responder: &mut R) -> Result<(), ServeError>
where
    R: Responder + Send,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    loop {
        buf.reserve(CHUNK_SIZE);
        if file.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
        responder.write_chunk(buf.split().freeze()).await?;
    }
}

async fn render_error<R>(ctx: &RequestContext, err: &ServeError, responder: &mut R)
where
    R: Responder + Send,
{
    if matches!(err, ServeError::Disconnected) {
        logger::log_warning(&format!("{err} while serving {}", ctx.url));
        return;
    }

    logger::log_error(&format!("{err} ({})", ctx.url));
    let fragment = error_fragment(&err.to_string(), &ctx.absolute_path);
    // Nothing left to tell a client that is gone.
    let _ = responder.write_chunk(Bytes::from(fragment)).await;
}

/// `<h1>message</h1><p>path</p>`, escaped
pub fn error_fragment(message: &str, path: &Path) -> String {
    format!(
        "<h1>{}</h1><p>{}</p>",
        html_escape::encode_text(message),
        html_escape::encode_text(&path.display().to_string()),
    )
}
