//! HTTP protocol layer module
//!
//! Content-Type lookup and the transport-independent response capability.

pub mod mime;
pub mod response;

// Re-export commonly used types
pub use mime::{resolver_for, ContentTypeResolver};
pub use response::{channel, ChannelResponder, Responder, ResponseBody};
