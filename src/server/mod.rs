// Server module entry point
// Startup checks, transport selection and the accept loop

pub mod connection;
pub mod listener;
pub mod signal;
pub mod tls;

// `loop` is a keyword, hence the module rename
#[path = "loop.rs"]
pub mod server_loop;

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::{AppState, Config};
use crate::error::StartupError;
use crate::logger;

pub use connection::Transport;
pub use listener::{check_port, create_reusable_listener};
pub use server_loop::start_server_loop;

/// Canonical form of `root` if it is an existing directory
pub fn check_root(root: &Path) -> Result<PathBuf, StartupError> {
    match root.canonicalize() {
        Ok(path) if path.is_dir() => Ok(path),
        _ => Err(StartupError::RootNotFound(
            std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf()),
        )),
    }
}

/// A bound server that has not started accepting yet
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
    transport: Transport,
}

impl Server {
    /// Run every startup check and bind the listener.
    ///
    /// Fails without binding if the root is missing, the port is taken or
    /// the TLS credentials cannot be loaded.
    pub async fn bind(config: Config) -> Result<Self, StartupError> {
        config.validate()?;
        let root = check_root(&config.server.root)?;
        let addr = config.get_socket_addr()?;

        if !check_port(addr).await {
            return Err(StartupError::PortInUse(config.server.port));
        }

        let acceptor = if config.server.protocol.is_secure() {
            Some(tls::load_acceptor(&config.tls, config.server.protocol)?)
        } else {
            None
        };
        let transport = Transport::for_protocol(config.server.protocol, acceptor);

        let listener = create_reusable_listener(addr)?;
        let bound = listener.local_addr()?;
        logger::log_server_start(&bound, &root, &config);

        Ok(Self {
            listener,
            state: Arc::new(AppState::new(config, root)),
            transport,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until SIGINT/SIGTERM
    pub async fn run(self) {
        self.run_until(signal::shutdown_signal()).await;
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        start_server_loop(self.listener, self.state, self.transport, shutdown).await;
    }
}

/// Bind and serve until a shutdown signal arrives
pub async fn start(config: Config) -> Result<(), StartupError> {
    Server::bind(config).await?.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use http_body_util::{BodyExt, Empty};
    use hyper::body::{Bytes, Incoming};
    use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use std::fs;
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_rustls::client::TlsStream;
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio_rustls::TlsConnector;

    fn free_port() -> u16 {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    }

    fn config_for(root: &Path, port: u16) -> Config {
        let mut config = Config::defaults().unwrap();
        config.server.root = root.to_path_buf();
        config.server.port = port;
        config.logging.access_log = false;
        config
    }

    type Fetched = (StatusCode, Option<String>, Vec<u8>);

    fn get(uri: &str) -> Request<Empty<Bytes>> {
        Request::builder()
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .unwrap()
    }

    fn get_http1(path: &str) -> Request<Empty<Bytes>> {
        let mut req = get(path);
        req.headers_mut()
            .insert(HOST, HeaderValue::from_static("localhost"));
        req
    }

    async fn read_response(resp: Response<Incoming>) -> Fetched {
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = resp.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, content_type, body)
    }

    async fn fetch(addr: SocketAddr, path: &str) -> Fetched {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        read_response(sender.send_request(get_http1(path)).await.unwrap()).await
    }

    /// Open a TLS session to `addr` that trusts only `cert`
    async fn connect_tls(
        addr: SocketAddr,
        cert: CertificateDer<'static>,
        alpn: &[&str],
    ) -> TlsStream<TcpStream> {
        let mut roots = RootCertStore::empty();
        roots.add(cert).unwrap();
        let mut client = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        client.alpn_protocols = alpn.iter().map(|p| p.as_bytes().to_vec()).collect();

        let stream = TcpStream::connect(addr).await.unwrap();
        TlsConnector::from(Arc::new(client))
            .connect(ServerName::try_from("localhost").unwrap(), stream)
            .await
            .unwrap()
    }

    async fn fetch_https(addr: SocketAddr, cert: CertificateDer<'static>, path: &str) -> Fetched {
        let stream = connect_tls(addr, cert, &["http/1.1"]).await;
        assert_eq!(stream.get_ref().1.alpn_protocol(), Some(&b"http/1.1"[..]));

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);

        read_response(sender.send_request(get_http1(path)).await.unwrap()).await
    }

    fn secure_config(
        root: &Path,
        credentials: &Path,
        protocol: Protocol,
    ) -> (Config, CertificateDer<'static>) {
        let (tls, cert) = tls::testing::self_signed(credentials);
        let mut config = config_for(root, free_port());
        config.server.protocol = protocol;
        config.tls = tls;
        (config, cert)
    }

    fn patterned(len: u32) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    #[test]
    fn test_check_root() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            check_root(dir.path()).unwrap(),
            dir.path().canonicalize().unwrap()
        );

        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(check_root(&file), Err(StartupError::RootNotFound(_))));
        assert!(matches!(
            check_root(&dir.path().join("missing")),
            Err(StartupError::RootNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir.path().join("nowhere"), free_port());
        assert!(matches!(
            Server::bind(config).await,
            Err(StartupError::RootNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_rejects_busy_port() {
        let dir = TempDir::new().unwrap();
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();

        assert!(matches!(
            Server::bind(config_for(dir.path(), port)).await,
            Err(StartupError::PortInUse(p)) if p == port
        ));
    }

    #[tokio::test]
    async fn test_bind_requires_tls_material() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(dir.path(), free_port());
        config.server.protocol = Protocol::Http2;
        assert!(matches!(
            Server::bind(config).await,
            Err(StartupError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_serves_over_http1() {
        let dir = TempDir::new().unwrap();
        let big = patterned(300_000);
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(dir.path().join("big.bin"), &big).unwrap();

        let server = Server::bind(config_for(dir.path(), free_port()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let (status, content_type, body) = fetch(addr, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(body, b"<h1>hi</h1>");

        let (status, _, body) = fetch(addr, "/big.bin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, big);

        let (status, _, body) = fetch(addr, "/favicon.ico").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, _, body) = fetch(addr, "/missing.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("Artefact not found"));

        stop_tx.send(()).unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_serves_over_https() {
        let dir = TempDir::new().unwrap();
        let credentials = TempDir::new().unwrap();
        let big = patterned(200_000);
        fs::write(dir.path().join("style.css"), "body {}").unwrap();
        fs::write(dir.path().join("big.bin"), &big).unwrap();

        let (config, cert) = secure_config(dir.path(), credentials.path(), Protocol::Https);
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let (status, content_type, body) = fetch_https(addr, cert.clone(), "/style.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/css; charset=utf-8"));
        assert_eq!(body, b"body {}");

        let (status, _, body) = fetch_https(addr, cert.clone(), "/big.bin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, big);

        let (status, _, body) = fetch_https(addr, cert.clone(), "/favicon.ico").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let (status, _, body) = fetch_https(addr, cert, "/missing.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(String::from_utf8_lossy(&body).contains("Artefact not found"));

        stop_tx.send(()).unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_serves_over_http2() {
        let dir = TempDir::new().unwrap();
        let credentials = TempDir::new().unwrap();
        let big = patterned(300_000);
        fs::write(dir.path().join("big.bin"), &big).unwrap();

        let (config, cert) = secure_config(dir.path(), credentials.path(), Protocol::Http2);
        let server = Server::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let stream = connect_tls(addr, cert, &["h2", "http/1.1"]).await;
        assert_eq!(stream.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));

        let (mut sender, conn) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
                .await
                .unwrap();
        tokio::spawn(conn);

        let base = format!("https://localhost:{}", addr.port());

        let resp = sender.send_request(get(&format!("{base}/big.bin"))).await.unwrap();
        assert_eq!(resp.version(), hyper::Version::HTTP_2);
        let (status, _, body) = read_response(resp).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, big);

        let resp = sender
            .send_request(get(&format!("{base}/./favicon.ico")))
            .await
            .unwrap();
        let (status, _, body) = read_response(resp).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());

        let resp = sender
            .send_request(get(&format!("{base}/missing.txt")))
            .await
            .unwrap();
        let (status, _, body) = read_response(resp).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("Artefact not found"));
        assert!(body.contains("missing.txt"));

        drop(sender);
        stop_tx.send(()).unwrap();
        running.await.unwrap();
    }
}
