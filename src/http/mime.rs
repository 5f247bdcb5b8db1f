//! MIME type detection module
//!
//! Two interchangeable extension tables behind [`ContentTypeResolver`]:
//! a small built-in one and the full `mime_guess` one. The choice is made
//! once from configuration.

use crate::config::MimeTable;

/// Maps a file name to a Content-Type value.
///
/// `None` means the type is unknown; it is not an error.
pub trait ContentTypeResolver: Send + Sync {
    fn content_type(&self, file_name: &str) -> Option<String>;
}

/// Built-in table. Unknown or missing extensions become `text/plain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTable;

/// `mime_guess` backed table. Unknown extensions yield `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedTable;

/// Pick the resolver for the configured table
pub fn resolver_for(table: MimeTable) -> Box<dyn ContentTypeResolver> {
    match table {
        MimeTable::Builtin => Box::new(BuiltinTable),
        MimeTable::Extended => Box::new(ExtendedTable),
    }
}

/// Characters after the last `.` of a base name.
///
/// A leading dot marks a hidden file, not an extension.
fn extension(file_name: &str) -> Option<&str> {
    match file_name.rfind('.') {
        None | Some(0) => None,
        Some(i) => Some(&file_name[i + 1..]),
    }
}

impl ContentTypeResolver for BuiltinTable {
    fn content_type(&self, file_name: &str) -> Option<String> {
        let mime = match extension(file_name) {
            Some("html" | "htm") => "text/html; charset=utf-8",
            Some("css") => "text/css; charset=utf-8",
            Some("js" | "mjs") => "application/javascript; charset=utf-8",
            Some("json") => "application/json; charset=utf-8",
            Some("xml") => "application/xml",
            Some("md") => "text/markdown; charset=utf-8",
            Some("wasm") => "application/wasm",

            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("svg") => "image/svg+xml",
            Some("ico") => "image/x-icon",
            Some("webp") => "image/webp",

            Some("mp3") => "audio/mpeg",
            Some("mp4") => "video/mp4",
            Some("webm") => "video/webm",

            Some("woff") => "font/woff",
            Some("woff2") => "font/woff2",
            Some("ttf") => "font/ttf",

            Some("pdf") => "application/pdf",
            Some("zip") => "application/zip",

            _ => "text/plain",
        };
        Some(mime.to_string())
    }
}

impl ContentTypeResolver for ExtendedTable {
    fn content_type(&self, file_name: &str) -> Option<String> {
        let mime = mime_guess::from_ext(extension(file_name)?).first()?;

        let textual = mime.type_() == mime_guess::mime::TEXT
            || matches!(
                mime.essence_str(),
                "application/javascript" | "application/json"
            );

        if textual {
            Some(format!("{}; charset=utf-8", mime.essence_str()))
        } else {
            Some(mime.essence_str().to_string())
        }
    }
}
