//! Direct markup strategy: page shell plus concatenation, no rendering engine.

use async_trait::async_trait;
use std::path::Path;

use super::{OutputKind, RenderBackend, RenderEngine};
use crate::error::{CleanupError, SlipError};

pub const PAGE_STYLE: &str = "body{font-family:Arial;} .page-break{page-break-after:always;}";
pub const PAGE_BREAK: &str = r#"<div class="page-break"></div>"#;

fn document_head() -> String {
    format!(r#"<html><head><style>{PAGE_STYLE}</style></head><body>"#)
}

/// Wrap a single fragment into a standalone page.
pub fn page_shell(fragment: &str) -> String {
    let mut html = document_head();
    html.push_str(fragment);
    html.push_str("</body></html>");
    html
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupBackend;

impl MarkupBackend {
    /// One document holding every fragment in order, with a page break
    /// between consecutive records.
    pub fn combine<S: AsRef<str>>(fragments: &[S]) -> String {
        let body = fragments
            .iter()
            .map(|f| f.as_ref())
            .collect::<Vec<_>>()
            .join(PAGE_BREAK);
        page_shell(&body)
    }
}

#[async_trait]
impl RenderBackend for MarkupBackend {
    fn output_kind(&self) -> OutputKind {
        OutputKind::Html
    }

    async fn launch(&self) -> Result<Box<dyn RenderEngine>, SlipError> {
        Ok(Box::new(MarkupEngine))
    }
}

struct MarkupEngine;

#[async_trait]
impl RenderEngine for MarkupEngine {
    async fn render(
        &mut self,
        position: usize,
        markup: &str,
        dest: &Path,
    ) -> Result<(), SlipError> {
        tokio::fs::write(dest, page_shell(markup))
            .await
            .map_err(|e| SlipError::record_failed(position, e))
    }

    async fn close(self: Box<Self>) -> Result<(), CleanupError> {
        Ok(())
    }
}
