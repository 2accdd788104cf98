//! Archive packager: a flat directory of slips into one zip file.

use log::info;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::SlipError;

const COMPRESSION_LEVEL: i64 = 9;

/// Pack every regular file of `source_dir` into `dest`, entries at the root
/// of the archive in file name order. Returns the number of entries once the
/// archive is flushed and synced to disk.
pub fn package_directory(source_dir: &Path, dest: &Path) -> Result<usize, SlipError> {
    write_archive(source_dir, dest).map_err(|e| SlipError::PackagingError(e.to_string()))
}

/// Same as [`package_directory`], on the blocking pool.
pub async fn package_directory_async(source_dir: PathBuf, dest: PathBuf) -> Result<usize, SlipError> {
    tokio::task::spawn_blocking(move || package_directory(&source_dir, &dest))
        .await
        .map_err(|e| SlipError::PackagingError(format!("packaging task failed: {e}")))?
}

fn write_archive(source_dir: &Path, dest: &Path) -> zip::result::ZipResult<usize> {
    let mut entries: Vec<PathBuf> = fs::read_dir(source_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|path| path.is_file() && path != dest)
        .collect();
    entries.sort();

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
    for path in &entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    info!("Packaged {} file(s) into {:?}", entries.len(), dest);
    Ok(entries.len())
}
