use std::path::PathBuf;
use std::sync::Arc;

use crate::batch::BatchPipeline;
use crate::config::AppConfig;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<BatchPipeline>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: BatchPipeline, upload_dir: PathBuf, max_upload_bytes: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            upload_dir,
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &AppConfig, pipeline: BatchPipeline) -> Self {
        Self::new(pipeline, config.upload_dir.clone(), config.max_upload_bytes)
    }
}
