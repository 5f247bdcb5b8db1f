// Configuration module entry point
// Loads configuration once at startup; it is never mutated afterwards

mod state;
mod types;

use std::net::SocketAddr;

use crate::error::StartupError;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, LoggingConfig, MimeConfig, MimeTable, PerformanceConfig, Protocol, ServerConfig,
    TlsConfig,
};

/// Environment variables overlay the file, e.g. `STATICO__SERVER__PORT=9000`
const ENV_PREFIX: &str = "STATICO";

/// File read when no path is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "config";

type Builder = config::builder::ConfigBuilder<config::builder::DefaultState>;

impl Config {
    /// Load configuration with the default file name `config` (any supported extension)
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from specified file path (extension optional).
    ///
    /// Sources are layered: built-in defaults, then the file if it exists,
    /// then `STATICO__*` environment variables.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = with_defaults(config::Config::builder())?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Configuration made of the built-in defaults only
    pub fn defaults() -> Result<Self, config::ConfigError> {
        with_defaults(config::Config::builder())?
            .build()?
            .try_deserialize()
    }

    /// Check the invariants serde cannot express
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.server.port == 0 {
            return Err(StartupError::Config(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.server.protocol.is_secure()
            && (self.tls.cert_file.is_none() || self.tls.key_file.is_none())
        {
            return Err(StartupError::Config(format!(
                "protocol '{}' requires tls.cert_file and tls.key_file",
                self.server.protocol
            )));
        }

        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, StartupError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| StartupError::Config(format!("Invalid address: {e}")))
    }

    /// URL announced at startup, e.g. `https://localhost:8443`
    pub fn local_url(&self) -> String {
        format!(
            "{}://localhost:{}",
            self.server.protocol.scheme(),
            self.server.port
        )
    }
}

fn with_defaults(builder: Builder) -> Result<Builder, config::ConfigError> {
    builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.root", ".")?
        .set_default("server.protocol", "http")?
        .set_default("mime.table", "extended")?
        .set_default("logging.access_log", true)?
        .set_default("logging.access_log_format", "common")?
        .set_default("performance.keep_alive", true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = Config::defaults().unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.protocol, Protocol::Http);
        assert_eq!(cfg.mime.table, MimeTable::Extended);
        assert!(cfg.tls.cert_file.is_none());
        assert!(cfg.logging.access_log);
        assert!(cfg.performance.keep_alive);
        assert!(cfg.performance.max_connections.is_none());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.local_url(), "http://localhost:8080");
    }

    #[test]
    fn test_file_overlays_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9443
root = "/srv/www"
protocol = "tls-http2"

[tls]
cert_file = "cert.pem"
key_file = "key.pem"

[mime]
table = "builtin"
"#
        )
        .unwrap();

        let path = file.path().with_extension("");
        let cfg = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9443);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.protocol, Protocol::Http2);
        assert_eq!(cfg.mime.table, MimeTable::Builtin);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.local_url(), "https://localhost:9443");
    }

    #[test]
    fn test_load_reads_default_file_name() {
        let cfg = Config::load().unwrap();
        let named = Config::load_from(DEFAULT_CONFIG_FILE).unwrap();
        assert_eq!(cfg.server.host, named.server.host);
        assert_eq!(cfg.server.port, named.server.port);
        assert_eq!(cfg.server.protocol, named.server.protocol);
    }

    #[test]
    fn test_protocol_aliases() {
        use serde::Deserialize;

        #[derive(Deserialize)]
        struct Wrapper {
            protocol: Protocol,
        }

        for (name, expected) in [
            ("plain", Protocol::Http),
            ("http", Protocol::Http),
            ("tls", Protocol::Https),
            ("https", Protocol::Https),
            ("tls-http2", Protocol::Http2),
            ("http2", Protocol::Http2),
        ] {
            let parsed: Wrapper = config::Config::builder()
                .set_override("protocol", name)
                .unwrap()
                .build()
                .unwrap()
                .try_deserialize()
                .unwrap();
            assert_eq!(parsed.protocol, expected, "alias {name}");
        }
    }

    #[test]
    fn test_secure_protocol_requires_credentials() {
        let mut cfg = Config::defaults().unwrap();
        cfg.server.protocol = Protocol::Https;
        assert!(matches!(cfg.validate(), Err(StartupError::Config(_))));

        cfg.tls.cert_file = Some("cert.pem".into());
        cfg.tls.key_file = Some("key.pem".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut cfg = Config::defaults().unwrap();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let cfg = Config::defaults().unwrap();
        assert_eq!(
            cfg.get_socket_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }
}
