//! statico: a minimal static-asset server.
//!
//! Resolves request paths beneath a configured root, infers a content type
//! and streams file bytes back over plain HTTP, HTTPS or HTTP/2.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
