//! Parallel ingestion of a capture directory.

use std::fs;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use rayon::prelude::*;

use super::ingest::{parse, IngestError};
use super::naming::{capture_point_from_filename, SUMMARY_EXTENSION};
use super::record::CaptureRecord;

/// A capture file that could not be ingested
#[derive(Debug)]
pub struct CaptureFailure {
    pub file: String,
    pub error: IngestError,
}

/// Every capture file's result, sorted by file name
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub records: Vec<CaptureRecord>,
    pub failures: Vec<CaptureFailure>,
}

/// Summary files in `dir`, sorted by name
pub fn discover_captures(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let io_error = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SUMMARY_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Ingest one capture file
pub fn ingest_file(path: &Path, address_space: &IpNet) -> Result<CaptureRecord, IngestError> {
    let point = capture_point_from_filename(path)?;
    let raw = fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw, &point, address_space)
}

/// Ingest every summary in `dir` in parallel.
///
/// Waits for all files before returning; failed files are reported, never
/// dropped.
pub fn ingest_directory(dir: &Path, address_space: &IpNet) -> Result<IngestOutcome, IngestError> {
    let files = discover_captures(dir)?;
    log::info!("Ingesting {} capture files from {}", files.len(), dir.display());

    let results: Vec<(String, Result<CaptureRecord, IngestError>)> = files
        .par_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (name, ingest_file(path, address_space))
        })
        .collect();

    let mut outcome = IngestOutcome::default();
    for (file, result) in results {
        match result {
            Ok(record) => {
                log::debug!("Ingested {}: {} frames", file, record.total);
                outcome.records.push(record);
            }
            Err(error) => {
                log::warn!("Excluding capture {}: {}", file, error);
                outcome.failures.push(CaptureFailure { file, error });
            }
        }
    }
    Ok(outcome)
}
