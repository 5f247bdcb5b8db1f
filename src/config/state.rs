// Application state module
// Read-only configuration plus the per-process connection counter

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;

use super::types::Config;
use crate::http::mime::{self, ContentTypeResolver};

/// State shared by every connection and request
pub struct AppState {
    pub config: Config,
    /// Absolute, canonical form of `config.server.root`
    pub root: PathBuf,
    /// Extension table picked once from `config.mime.table`
    pub content_types: Box<dyn ContentTypeResolver>,
    pub active_connections: AtomicUsize,
}

impl AppState {
    /// Create `AppState` for an already validated root directory
    pub fn new(config: Config, root: PathBuf) -> Self {
        let content_types = mime::resolver_for(config.mime.table);

        Self {
            config,
            root,
            content_types,
            active_connections: AtomicUsize::new(0),
        }
    }
}
