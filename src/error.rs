//! Error types
//!
//! `StartupError` is fatal to the bootstrap sequence, `ServeError` is
//! contained within a single request.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the server from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Path \"{}\" can not be found", .0.display())]
    RootNotFound(PathBuf),

    #[error("Port \"{0}\" is already in use")]
    PortInUse(u16),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigSource(#[from] ::config::ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures while answering one request
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Artefact not found")]
    NotFound,

    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// The client went away while the body was being written.
    #[error("Client closed the connection")]
    Disconnected,

    #[error(transparent)]
    Io(#[from] io::Error),
}
