// Connection handling module
// Accepts one TCP connection and serves it over the configured transport

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;

use crate::config::{AppState, Protocol};
use crate::handler;
use crate::logger;

type ConnectionError = Box<dyn std::error::Error + Send + Sync>;

/// Socket layer chosen at startup
#[derive(Clone)]
pub enum Transport {
    Plain,
    Tls {
        acceptor: TlsAcceptor,
        /// Negotiate HTTP/2 via ALPN
        http2: bool,
    },
}

impl Transport {
    pub fn for_protocol(protocol: Protocol, acceptor: Option<TlsAcceptor>) -> Self {
        match (protocol, acceptor) {
            (Protocol::Http, _) | (_, None) => Self::Plain,
            (Protocol::Https, Some(acceptor)) => Self::Tls {
                acceptor,
                http2: false,
            },
            (Protocol::Http2, Some(acceptor)) => Self::Tls {
                acceptor,
                http2: true,
            },
        }
    }
}

/// Decrements the active connection counter however the task ends
struct ConnectionGuard(Arc<AppState>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.active_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accept a connection, checking the connection limit, and serve it in a
/// spawned task.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    transport: &Transport,
) {
    // Increment counter first, then check limit
    let prev_count = state.active_connections.fetch_add(1, Ordering::SeqCst);
    let guard = ConnectionGuard(Arc::clone(state));

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection rejected."
            ));
            return;
        }
    }

    if state.config.logging.access_log {
        logger::log_connection_accepted(&peer_addr);
    }

    let state = Arc::clone(state);
    let transport = transport.clone();
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(err) = serve_connection(stream, peer_addr, state, transport).await {
            logger::log_connection_error(&err);
        }
    });
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
    transport: Transport,
) -> Result<(), ConnectionError> {
    match transport {
        Transport::Plain => serve_http1(stream, peer_addr, state).await,
        Transport::Tls { acceptor, http2 } => {
            let tls_stream = acceptor.accept(stream).await?;
            if http2 {
                serve_auto(tls_stream, peer_addr, state).await
            } else {
                serve_http1(tls_stream, peer_addr, state).await
            }
        }
    }
}

/// HTTP/1.x over any byte stream
async fn serve_http1<S>(
    stream: S,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = http1::Builder::new();
    builder.keep_alive(state.config.performance.keep_alive);

    let service = service_fn(move |req| handler::handle_request(req, peer_addr, Arc::clone(&state)));
    builder
        .serve_connection(TokioIo::new(stream), service)
        .await?;
    Ok(())
}

/// HTTP/2 or HTTP/1.1, whichever the client speaks
async fn serve_auto<S>(
    stream: S,
    peer_addr: SocketAddr,
    state: Arc<AppState>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .keep_alive(state.config.performance.keep_alive);

    let service = service_fn(move |req| handler::handle_request(req, peer_addr, Arc::clone(&state)));
    builder
        .serve_connection(TokioIo::new(stream), service)
        .await
}
