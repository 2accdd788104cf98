//! Batch orchestrator.
//!
//! Drives one upload through Row Source -> Template Binder -> Render Backend
//! and assembles the deliverable for the configured [`DeliveryMode`].
//!
//! Resources are scoped: the staged upload, the [`WorkingArea`] and the render
//! engine each have their own release step, run on every exit path and logged
//! rather than raised when they fail.

pub mod index;
pub mod state;
pub mod working_area;

use actix_web::web::Bytes;
use futures::Stream;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::archive::package_directory_async;
use crate::config::{DeliveryMode, PipelineConfig, RenderStrategy};
use crate::error::SlipError;
use crate::render::{
    field_text, unit_stem, HeadlessBackend, MarkupBackend, RenderBackend, RenderEngine,
};
use crate::rows::{load_rows, Record, TabularFormat};
use crate::template::{SharedContext, SlipTemplate};
use crate::upload::StagedUpload;

pub use index::{render_index, IndexEntry};
pub use state::{BatchStage, BatchTracker};
pub use working_area::WorkingArea;

/// URL prefix under which indexed batches are served.
pub const SLIPS_ROUTE: &str = "/slips";

/// Output of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutput {
    /// Bound markup kept in memory (combined mode).
    Fragment(String),
    /// File name inside the working area.
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedUnit {
    pub position: usize,
    pub name: Option<String>,
    pub identifier: Option<String>,
    pub output: UnitOutput,
}

impl RenderedUnit {
    fn new(position: usize, record: &Record, config: &PipelineConfig, output: UnitOutput) -> Self {
        Self {
            position,
            name: field_text(record, &config.name_field),
            identifier: field_text(record, &config.id_field),
            output,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match &self.output {
            UnitOutput::File(name) => Some(name),
            UnitOutput::Fragment(_) => None,
        }
    }
}

/// What a successful batch hands back to the caller.
#[derive(Debug)]
pub enum Delivery {
    /// Combined HTML document.
    Document { html: String, units: usize },
    /// Index page; the files stay under `dir`.
    Index {
        html: String,
        dir: PathBuf,
        units: Vec<RenderedUnit>,
    },
    Archive(ArchiveDownload),
}

/// A packaged archive together with the working area holding it. The area is
/// removed once the download stream is dropped.
#[derive(Debug)]
pub struct ArchiveDownload {
    path: PathBuf,
    file_name: String,
    entries: usize,
    area: WorkingArea,
}

impl ArchiveDownload {
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub async fn into_stream(self) -> io::Result<ArchiveStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(ArchiveStream {
            inner: ReaderStream::new(file),
            _area: self.area,
        })
    }
}

/// Archive body stream that owns the working area until it is dropped.
pub struct ArchiveStream {
    inner: ReaderStream<tokio::fs::File>,
    _area: WorkingArea,
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Process-wide pipeline: configuration plus the immutable shared state every
/// batch reads.
pub struct BatchPipeline {
    config: PipelineConfig,
    template: Arc<SlipTemplate>,
    shared: Arc<SharedContext>,
    backend: Arc<dyn RenderBackend>,
    engine_permits: Semaphore,
}

impl BatchPipeline {
    pub fn new(
        config: PipelineConfig,
        template: Arc<SlipTemplate>,
        shared: Arc<SharedContext>,
        backend: Arc<dyn RenderBackend>,
    ) -> Self {
        let permits = config.max_concurrent_engines.max(1);
        Self {
            config,
            template,
            shared,
            backend,
            engine_permits: Semaphore::new(permits),
        }
    }

    /// Pipeline with the backend named by the configured strategy.
    pub fn from_config(
        config: PipelineConfig,
        template: Arc<SlipTemplate>,
        shared: Arc<SharedContext>,
    ) -> Self {
        let backend: Arc<dyn RenderBackend> = match config.strategy {
            RenderStrategy::Markup => Arc::new(MarkupBackend),
            RenderStrategy::Headless => Arc::new(HeadlessBackend::new(config.chrome.clone())),
        };
        Self::new(config, template, shared, backend)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one batch. The staged upload is deleted before this returns,
    /// whatever the outcome.
    pub async fn process(&self, upload: StagedUpload) -> Result<Delivery, SlipError> {
        let mut tracker = BatchTracker::new(Uuid::new_v4());
        let result = self.run(&mut tracker, &upload).await;

        match &result {
            Ok(_) => {
                tracker.advance(BatchStage::Delivered);
            }
            Err(e) => tracker.fail(e),
        }
        if let Err(e) = upload.discard() {
            warn!("[batch {}] {}", tracker.id(), e);
        }
        result
    }

    async fn run(
        &self,
        tracker: &mut BatchTracker,
        upload: &StagedUpload,
    ) -> Result<Delivery, SlipError> {
        let format = TabularFormat::from_filename(upload.original_name())?;
        let records = load_rows(upload.path().to_path_buf(), format).await?;
        info!(
            "[batch {}] '{}' has {} record(s)",
            tracker.id(),
            upload.original_name(),
            records.len()
        );
        tracker.advance(BatchStage::Parsed);

        match self.config.delivery {
            DeliveryMode::Combined => {
                tracker.advance(BatchStage::Rendering);
                let units = self.bind_all(&records)?;
                tracker.advance(BatchStage::Assembling);
                let fragments: Vec<&str> = units
                    .iter()
                    .filter_map(|unit| match &unit.output {
                        UnitOutput::Fragment(markup) => Some(markup.as_str()),
                        UnitOutput::File(_) => None,
                    })
                    .collect();
                Ok(Delivery::Document {
                    html: MarkupBackend::combine(&fragments),
                    units: units.len(),
                })
            }
            DeliveryMode::Indexed | DeliveryMode::Archive => {
                let area = WorkingArea::create(&self.config.output_dir, tracker.id())?;
                tracker.advance(BatchStage::Rendering);
                let units = self.render_files(tracker.id(), &records, &area).await?;
                tracker.advance(BatchStage::Assembling);
                self.assemble(units, area).await
            }
        }
    }

    fn bind_all(&self, records: &[Record]) -> Result<Vec<RenderedUnit>, SlipError> {
        records
            .iter()
            .enumerate()
            .map(|(position, record)| -> Result<RenderedUnit, SlipError> {
                let markup = self
                    .template
                    .bind(record, &self.shared)
                    .map_err(|e| SlipError::record_failed(position, e))?;
                Ok(RenderedUnit::new(
                    position,
                    record,
                    &self.config,
                    UnitOutput::Fragment(markup),
                ))
            })
            .collect()
    }

    /// Launch one engine, render every record in order, close the engine.
    async fn render_files(
        &self,
        batch_id: Uuid,
        records: &[Record],
        area: &WorkingArea,
    ) -> Result<Vec<RenderedUnit>, SlipError> {
        let _permit = self
            .engine_permits
            .acquire()
            .await
            .map_err(SlipError::engine_failed)?;

        let mut engine = self.backend.launch().await?;
        let batch_secs = self.config.batch_timeout.as_secs();
        let outcome = match timeout(
            self.config.batch_timeout,
            self.render_each(batch_id, engine.as_mut(), records, area),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SlipError::RenderTimeout {
                scope: "batch".to_string(),
                secs: batch_secs,
            }),
        };

        if let Err(e) = engine.close().await {
            warn!("[batch {}] {}", batch_id, e);
        }
        outcome
    }

    async fn render_each(
        &self,
        batch_id: Uuid,
        engine: &mut dyn RenderEngine,
        records: &[Record],
        area: &WorkingArea,
    ) -> Result<Vec<RenderedUnit>, SlipError> {
        let extension = self.backend.output_kind().extension();
        let record_secs = self.config.record_timeout.as_secs();
        let mut units = Vec::with_capacity(records.len());
        let mut stems = HashSet::new();

        for (position, record) in records.iter().enumerate() {
            let markup = self
                .template
                .bind(record, &self.shared)
                .map_err(|e| SlipError::record_failed(position, e))?;

            let stem = unit_stem(record, &self.config.id_field, position);
            if !stems.insert(stem.clone()) {
                warn!(
                    "[batch {}] record {} reuses file name '{}', the earlier slip is overwritten",
                    batch_id,
                    position + 1,
                    stem
                );
            }
            let file_name = format!("{stem}.{extension}");
            let dest = area.path().join(&file_name);

            match timeout(
                self.config.record_timeout,
                engine.render(position, &markup, &dest),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(SlipError::RenderTimeout {
                        scope: format!("record {}", position + 1),
                        secs: record_secs,
                    })
                }
            }
            debug!("[batch {}] rendered record {} -> {}", batch_id, position + 1, file_name);

            units.push(RenderedUnit::new(
                position,
                record,
                &self.config,
                UnitOutput::File(file_name),
            ));
        }
        Ok(units)
    }

    async fn assemble(
        &self,
        units: Vec<RenderedUnit>,
        area: WorkingArea,
    ) -> Result<Delivery, SlipError> {
        match self.config.delivery {
            DeliveryMode::Archive => {
                let dest = area.path().join(&self.config.archive_name);
                let entries =
                    package_directory_async(area.path().to_path_buf(), dest.clone()).await?;
                Ok(Delivery::Archive(ArchiveDownload {
                    path: dest,
                    file_name: self.config.archive_name.clone(),
                    entries,
                    area,
                }))
            }
            _ => {
                let entries = index_entries(&units, area.name());
                let html = render_index("Salary slips", &entries);
                let dir = area.persist();
                Ok(Delivery::Index { html, dir, units })
            }
        }
    }
}

fn index_entries(units: &[RenderedUnit], area_name: &str) -> Vec<IndexEntry> {
    units
        .iter()
        .filter_map(|unit| {
            let file_name = unit.file_name()?;
            Some(IndexEntry {
                name: unit
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Record {}", unit.position + 1)),
                identifier: unit.identifier.clone().unwrap_or_else(|| "-".to_string()),
                href: format!("{SLIPS_ROUTE}/{area_name}/{file_name}"),
            })
        })
        .collect()
}
