//! Response capability module
//!
//! The request handler talks to the transport only through [`Responder`]:
//! set a header, write the status, write body chunks, end. The hyper-backed
//! [`ChannelResponder`] serves HTTP/1.1 and HTTP/2 alike.

use std::convert::Infallible;
use std::future::Future;

use http_body_util::StreamBody;
use hyper::body::{Bytes, Frame};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ServeError;
use crate::logger;

/// Body frames in flight per response. One chunk keeps file reads in step
/// with the transport's flow control.
const BODY_CHANNEL_CAPACITY: usize = 1;

type BodyFrame = Result<Frame<Bytes>, Infallible>;

/// Streaming body handed to hyper
pub type ResponseBody = StreamBody<ReceiverStream<BodyFrame>>;

/// Abstract response for one request.
///
/// The status is written once. Writing a chunk before any status implies
/// `200 OK`. `end` finalizes the response; implementations also finalize on
/// drop so every exit path closes the response exactly once.
pub trait Responder {
    /// Record a header. Ignored once the status has been written.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Write the status line and the recorded headers.
    fn write_head(&mut self, status: StatusCode);

    /// Status written so far, if any
    fn status(&self) -> Option<StatusCode>;

    /// Body bytes accepted so far
    fn bytes_written(&self) -> u64;

    fn write_chunk(&mut self, chunk: Bytes)
        -> impl Future<Output = Result<(), ServeError>> + Send;

    fn end(self);
}

/// Create a responder and the receiver that yields its hyper response once
/// the status has been written.
pub fn channel() -> (ChannelResponder, oneshot::Receiver<Response<ResponseBody>>) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

    let responder = ChannelResponder {
        head_tx: Some(head_tx),
        headers: HeaderMap::new(),
        status: None,
        body_tx: Some(body_tx),
        body_rx: Some(body_rx),
        bytes_written: 0,
    };
    (responder, head_rx)
}

/// A body that ends immediately
pub fn empty_body() -> ResponseBody {
    let (_, rx) = mpsc::channel(1);
    StreamBody::new(ReceiverStream::new(rx))
}

/// [`Responder`] that feeds a hyper response through channels.
///
/// The status and headers travel over a oneshot, body chunks over a bounded
/// mpsc. Dropping the sender ends the body.
pub struct ChannelResponder {
    head_tx: Option<oneshot::Sender<Response<ResponseBody>>>,
    headers: HeaderMap,
    status: Option<StatusCode>,
    body_tx: Option<mpsc::Sender<BodyFrame>>,
    body_rx: Option<mpsc::Receiver<BodyFrame>>,
    bytes_written: u64,
}

impl ChannelResponder {
    /// Idempotent. Sends an implicit `200 OK` if no status was written.
    fn finish(&mut self) {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }
        self.body_tx = None;
    }
}

impl Responder for ChannelResponder {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.status.is_none() {
            self.headers.insert(name, value);
        }
    }

    fn write_head(&mut self, status: StatusCode) {
        if let Some(sent) = self.status {
            logger::log_warning(&format!(
                "Status {status} ignored, {sent} was already written"
            ));
            return;
        }
        self.status = Some(status);

        let (Some(head_tx), Some(body_rx)) = (self.head_tx.take(), self.body_rx.take()) else {
            return;
        };

        let mut response = Response::new(StreamBody::new(ReceiverStream::new(body_rx)));
        *response.status_mut() = status;
        *response.headers_mut() = std::mem::take(&mut self.headers);

        // The connection may already be gone; the body writes will notice.
        let _ = head_tx.send(response);
    }

    fn status(&self) -> Option<StatusCode> {
        self.status
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), ServeError> {
        if self.status.is_none() {
            self.write_head(StatusCode::OK);
        }

        let len = chunk.len() as u64;
        let Some(body_tx) = &self.body_tx else {
            return Err(ServeError::Disconnected);
        };
        body_tx
            .send(Ok(Frame::data(chunk)))
            .await
            .map_err(|_| ServeError::Disconnected)?;

        self.bytes_written += len;
        Ok(())
    }

    fn end(mut self) {
        self.finish();
    }
}

impl Drop for ChannelResponder {
    fn drop(&mut self) {
        self.finish();
    }
}
