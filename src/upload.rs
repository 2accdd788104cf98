//! Staging of the uploaded spreadsheet.
//!
//! The upload lives in a named temp file under the uploads directory and keeps
//! its original extension, which the workbook reader uses to pick a format.
//! Dropping a [`StagedUpload`] removes the file.

use actix_multipart::Multipart;
use futures::TryStreamExt;
use log::debug;
use sanitize_filename::sanitize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{CleanupError, SlipError};
use crate::rows::TabularFormat;

/// Multipart field that carries the spreadsheet.
pub const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    original_name: String,
}

impl StagedUpload {
    fn create(dir: &Path, original_name: &str) -> Result<NamedTempFile, SlipError> {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default();

        Ok(tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&ext)
            .tempfile_in(dir)?)
    }

    /// Stage an in-memory upload. The extension is checked before anything is
    /// written.
    pub fn from_bytes(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self, SlipError> {
        let original_name = sanitize(original_name);
        TabularFormat::from_filename(&original_name)?;

        let mut file = Self::create(dir, &original_name)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file,
            original_name,
        })
    }

    /// Stream the `file` field of a multipart body to disk.
    ///
    /// Unsupported extensions are rejected before the body is read; bodies
    /// above `max_bytes` are rejected as invalid input.
    pub async fn from_multipart(
        mut payload: Multipart,
        dir: &Path,
        max_bytes: usize,
    ) -> Result<Self, SlipError> {
        while let Some(mut field) = payload
            .try_next()
            .await
            .map_err(|e| SlipError::InvalidInput(e.to_string()))?
        {
            let Some(content_disposition) = field.content_disposition() else {
                continue;
            };
            if content_disposition.get_name() != Some(FILE_FIELD) {
                continue;
            }
            let Some(filename) = content_disposition.get_filename() else {
                return Err(SlipError::NoFile);
            };
            let original_name = sanitize(filename);
            TabularFormat::from_filename(&original_name)?;

            let mut file = Self::create(dir, &original_name)?;
            let mut written = 0usize;
            while let Some(chunk) = field
                .try_next()
                .await
                .map_err(|e| SlipError::InvalidInput(e.to_string()))?
            {
                written += chunk.len();
                if written > max_bytes {
                    return Err(SlipError::InvalidInput(format!(
                        "upload exceeds {max_bytes} bytes"
                    )));
                }
                file.write_all(&chunk)?;
            }
            file.flush()?;

            if written == 0 {
                return Err(SlipError::NoFile);
            }
            debug!("Staged upload '{}' ({} bytes) at {:?}", original_name, written, file.path());
            return Ok(Self {
                file,
                original_name,
            });
        }

        Err(SlipError::NoFile)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Delete the staged file, reporting failures instead of swallowing them.
    pub fn discard(self) -> Result<(), CleanupError> {
        let path = self.file.path().to_path_buf();
        self.file
            .close()
            .map_err(|source| CleanupError::Upload { path, source })
    }
}
