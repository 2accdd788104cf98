//! Headless browser strategy.
//!
//! One Chromium process per batch, one tab per record. Each tab loads the
//! bound markup, waits until the page and its images have settled, prints an
//! A4 PDF and is closed again, also when printing failed.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, info, warn};
use std::path::Path;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use super::markup::page_shell;
use super::{OutputKind, RenderBackend, RenderEngine};
use crate::config::ChromeConfig;
use crate::error::{CleanupError, SlipError};

const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;
/// 10 mm on every side.
const MARGIN_IN: f64 = 0.3937;

/// Resolves once the document has loaded and no image or font is pending.
const IDLE_SCRIPT: &str = r#"(async () => {
  if (document.readyState !== 'complete') {
    await new Promise((resolve) => window.addEventListener('load', resolve, { once: true }));
  }
  await Promise.all(Array.from(document.images)
    .filter((img) => !img.complete)
    .map((img) => new Promise((resolve) => { img.onload = img.onerror = resolve; })));
  if (document.fonts && document.fonts.ready) {
    await document.fonts.ready;
  }
  return true;
})()"#;

fn pdf_params() -> PrintToPdfParams {
    PrintToPdfParams {
        print_background: Some(true),
        paper_width: Some(A4_WIDTH_IN),
        paper_height: Some(A4_HEIGHT_IN),
        margin_top: Some(MARGIN_IN),
        margin_bottom: Some(MARGIN_IN),
        margin_left: Some(MARGIN_IN),
        margin_right: Some(MARGIN_IN),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    chrome: ChromeConfig,
}

impl HeadlessBackend {
    pub fn new(chrome: ChromeConfig) -> Self {
        Self { chrome }
    }
}

#[async_trait]
impl RenderBackend for HeadlessBackend {
    fn output_kind(&self) -> OutputKind {
        OutputKind::Pdf
    }

    async fn launch(&self) -> Result<Box<dyn RenderEngine>, SlipError> {
        // Concurrent batches must not share a browser profile.
        let profile = tempfile::Builder::new()
            .prefix("slip-chrome-")
            .tempdir()
            .map_err(SlipError::engine_failed)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if let Some(executable) = &self.chrome.executable {
            builder = builder.chrome_executable(executable);
        }
        if self.chrome.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(SlipError::engine_failed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(SlipError::engine_failed)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event loop stopped: {}", e);
                    break;
                }
            }
        });

        info!("Launched headless browser");
        Ok(Box::new(HeadlessEngine {
            browser,
            handler_task,
            _profile: profile,
        }))
    }
}

struct HeadlessEngine {
    browser: Browser,
    handler_task: JoinHandle<()>,
    _profile: TempDir,
}

async fn capture(page: &Page, markup: &str) -> Result<Vec<u8>, String> {
    page.set_content(page_shell(markup))
        .await
        .map_err(|e| format!("failed to load content: {e}"))?;

    let idle = EvaluateParams::builder()
        .expression(IDLE_SCRIPT)
        .await_promise(true)
        .build()?;
    page.evaluate(idle)
        .await
        .map_err(|e| format!("page did not settle: {e}"))?;

    page.pdf(pdf_params())
        .await
        .map_err(|e| format!("failed to print PDF: {e}"))
}

#[async_trait]
impl RenderEngine for HeadlessEngine {
    async fn render(
        &mut self,
        position: usize,
        markup: &str,
        dest: &Path,
    ) -> Result<(), SlipError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SlipError::record_failed(position, format!("failed to open tab: {e}")))?;

        let captured = capture(&page, markup).await;
        if let Err(e) = page.close().await {
            warn!("Failed to close tab for record {}: {}", position + 1, e);
        }

        let pdf = captured.map_err(|e| SlipError::record_failed(position, e))?;
        tokio::fs::write(dest, pdf)
            .await
            .map_err(|e| SlipError::record_failed(position, e))?;
        debug!("Printed record {} to {:?}", position + 1, dest);
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<(), CleanupError> {
        let closed = self.browser.close().await;
        if closed.is_err() {
            let _ = self.browser.kill().await;
        }
        let exited = self.browser.wait().await;
        self.handler_task.abort();

        closed.map_err(|e| CleanupError::Engine(e.to_string()))?;
        exited.map_err(|e| CleanupError::Engine(e.to_string()))?;
        info!("Headless browser shut down");
        Ok(())
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        // Only reached without `close` when the batch future was cancelled.
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_params_are_a4_with_uniform_margins() {
        let params = pdf_params();
        assert_eq!(params.paper_width, Some(A4_WIDTH_IN));
        assert_eq!(params.paper_height, Some(A4_HEIGHT_IN));
        for margin in [
            params.margin_top,
            params.margin_bottom,
            params.margin_left,
            params.margin_right,
        ] {
            assert_eq!(margin, Some(MARGIN_IN));
        }
        assert_eq!(params.print_background, Some(true));
    }

    #[test]
    fn test_backend_produces_pdf() {
        assert_eq!(HeadlessBackend::default().output_kind(), OutputKind::Pdf);
    }
}
