//! Saving pipeline results to disk.
//!
//! The final image is written as [`DEFAULT_FILE_NAME`]; each recorded
//! snapshot is written next to it as `<key>.png`.

use std::path::{Path, PathBuf};

use lumen_pipeline::{PipelineResult, SnapshotKey};

use crate::raster::{RasterError, encode_png};

/// File name used for the final processed image.
pub const DEFAULT_FILE_NAME: &str = "processed-image.png";

/// File name for the snapshot stored under `key`.
#[must_use]
pub fn snapshot_file_name(key: SnapshotKey) -> String {
    format!("{key}.png")
}

/// Write every snapshot and the final output of `result` into `dir`.
///
/// `dir` is created if it does not exist. Existing files with the same
/// names are overwritten. Returns the written paths, snapshots first in
/// pipeline order and the final image last.
///
/// # Errors
///
/// Returns [`RasterError::Io`] if the directory cannot be created or a
/// file cannot be written, and [`RasterError::Encode`] if PNG encoding
/// fails.
pub fn write_result(dir: &Path, result: &PipelineResult) -> Result<Vec<PathBuf>, RasterError> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(result.snapshots.len() + 1);
    for (key, buffer) in result.snapshots.iter() {
        let path = dir.join(snapshot_file_name(key));
        std::fs::write(&path, encode_png(buffer)?)?;
        written.push(path);
    }

    let path = dir.join(DEFAULT_FILE_NAME);
    std::fs::write(&path, encode_png(&result.output)?)?;
    written.push(path);

    tracing::info!(dir = %dir.display(), files = written.len(), "wrote pipeline images");
    Ok(written)
}
