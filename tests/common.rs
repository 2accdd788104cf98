#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use salary_slip_server::batch::BatchPipeline;
use salary_slip_server::config::{DeliveryMode, PipelineConfig, RenderStrategy};
use salary_slip_server::error::{CleanupError, SlipError};
use salary_slip_server::render::{OutputKind, RenderBackend, RenderEngine};
use salary_slip_server::template::{SharedContext, SlipTemplate};
use salary_slip_server::upload::StagedUpload;

pub const SLIP_TEMPLATE: &str = r#"<section class="slip"><h2>{{name}}</h2><p>Code: {{code}}</p><p>Basic: {{basic}}</p><p>Net: {{subtract basic deduction}}</p>{{#if logoUrl}}<img src="{{logoUrl}}">{{/if}}</section>"#;

pub const TWO_EMPLOYEES: &str = "name,code,basic,deduction\nAlice,E1,1000,50\nBob,E2,2000,100\n";

pub fn five_employees() -> String {
    let mut csv = String::from("name,code,basic,deduction\n");
    for i in 1..=5 {
        csv.push_str(&format!("Employee {i},E{i},{},{}\n", i * 1000, i * 10));
    }
    csv
}

/// Test workspace: upload and output roots under one temp dir.
pub struct Workspace {
    pub root: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        let dir = self.root.path().join("uploads");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.path().join("slips")
    }

    pub fn stage(&self, name: &str, contents: &str) -> StagedUpload {
        StagedUpload::from_bytes(&self.upload_dir(), name, contents.as_bytes()).unwrap()
    }

    pub fn config(&self, delivery: DeliveryMode) -> PipelineConfig {
        PipelineConfig::new(delivery, RenderStrategy::Markup, self.output_dir())
    }
}

/// Number of entries in `dir`, zero when it does not exist.
pub fn entry_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

pub fn template() -> Arc<SlipTemplate> {
    Arc::new(SlipTemplate::from_source(SLIP_TEMPLATE).unwrap())
}

pub fn pipeline(config: PipelineConfig, backend: Arc<dyn RenderBackend>) -> BatchPipeline {
    BatchPipeline::new(config, template(), Arc::new(SharedContext::default()), backend)
}

/// Backend that writes the bound markup as-is and can be told to misbehave.
#[derive(Default)]
pub struct FakeBackend {
    pub fail_at: Option<usize>,
    pub fail_launch: bool,
    pub delay: Option<Duration>,
    pub launches: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub rendered: Arc<Mutex<Vec<usize>>>,
}

impl FakeBackend {
    pub fn failing_at(position: usize) -> Self {
        Self {
            fail_at: Some(position),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn rendered(&self) -> Vec<usize> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderBackend for FakeBackend {
    fn output_kind(&self) -> OutputKind {
        OutputKind::Html
    }

    async fn launch(&self) -> Result<Box<dyn RenderEngine>, SlipError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(SlipError::engine_failed("browser did not start"));
        }
        Ok(Box::new(FakeEngine {
            fail_at: self.fail_at,
            delay: self.delay,
            closes: self.closes.clone(),
            rendered: self.rendered.clone(),
        }))
    }
}

struct FakeEngine {
    fail_at: Option<usize>,
    delay: Option<Duration>,
    closes: Arc<AtomicUsize>,
    rendered: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn render(&mut self, position: usize, markup: &str, dest: &Path) -> Result<(), SlipError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(position) {
            return Err(SlipError::record_failed(position, "injected failure"));
        }
        tokio::fs::write(dest, markup).await?;
        self.rendered.lock().unwrap().push(position);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), CleanupError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
