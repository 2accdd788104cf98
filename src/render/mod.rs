//! Render backends - turn bound markup into deliverable documents.
//!
//! Two strategies share one interface:
//! - [`MarkupBackend`] writes HTML pages directly, no external process.
//! - [`HeadlessBackend`] prints one PDF per record through a headless browser.
//!
//! A backend is launched once per batch. The returned [`RenderEngine`] renders
//! records one after another and must be closed exactly once.

pub mod headless;
pub mod markup;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::error::{CleanupError, SlipError};
use crate::rows::Record;

pub use headless::HeadlessBackend;
pub use markup::MarkupBackend;

/// File type a backend produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Html,
    Pdf,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Deployment-wide render strategy.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    fn output_kind(&self) -> OutputKind;

    /// Start the engine for one batch.
    async fn launch(&self) -> Result<Box<dyn RenderEngine>, SlipError>;
}

/// A running engine, exclusively owned by one batch.
#[async_trait]
pub trait RenderEngine: Send {
    /// Render the bound markup of the record at `position` into `dest`.
    async fn render(&mut self, position: usize, markup: &str, dest: &Path)
        -> Result<(), SlipError>;

    /// Release the engine and everything it started.
    async fn close(self: Box<Self>) -> Result<(), CleanupError>;
}

/// Make a string safe for file names and URL paths.
///
/// Keeps ASCII letters and digits, folds whitespace, `-` and `_` runs into a
/// single dash and drops everything else.
pub fn sanitize_stem(name: &str, fallback: &str) -> String {
    let mut result = String::new();
    let mut last_dash = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch);
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_' || ch == '.')
            && !last_dash
            && !result.is_empty()
        {
            result.push('-');
            last_dash = true;
        }
    }

    let result = result.trim_matches('-');
    if result.is_empty() {
        return fallback.to_string();
    }
    result.to_string()
}

/// Text of a field usable as a label or identifier.
pub fn field_text(record: &Record, field: &str) -> Option<String> {
    let text = match record.get(field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Output file stem: the record's identifier when it has one, else its
/// 1-based row position.
pub fn unit_stem(record: &Record, id_field: &str, position: usize) -> String {
    let fallback = format!("record-{}", position + 1);
    match field_text(record, id_field) {
        Some(id) => sanitize_stem(&id, &fallback),
        None => fallback,
    }
}
