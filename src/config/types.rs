// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    pub mime: MimeConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory that bounds the servable content
    pub root: PathBuf,
    pub protocol: Protocol,
    pub workers: Option<usize>,
}

/// Transport the listener speaks
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[serde(alias = "plain")]
    Http,
    #[serde(alias = "tls")]
    Https,
    /// TLS with ALPN negotiation of HTTP/2, falling back to HTTP/1.1
    #[serde(alias = "tls-http2")]
    Http2,
}

impl Protocol {
    pub const fn is_secure(self) -> bool {
        !matches!(self, Self::Http)
    }

    pub const fn scheme(self) -> &'static str {
        if self.is_secure() {
            "https"
        } else {
            "http"
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Http2 => "http2",
        };
        f.write_str(name)
    }
}

/// TLS credential material, required for `https` and `http2`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// PEM encoded certificate chain
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    /// PEM encoded private key
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// Content-Type lookup configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MimeConfig {
    pub table: MimeTable,
}

/// Which extension table backs Content-Type lookups
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MimeTable {
    /// Small built-in table, unknown extensions become `text/plain`
    Builtin,
    /// Full `mime_guess` table, unknown extensions get no header
    Extended,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub access_log: bool,
    /// Access log format (common, combined or json)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "common".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    pub max_connections: Option<u64>,
}
