//! Result consumer
//!
//! Reads the validated artifact, prints it and re-serializes it as CSV. The
//! CSV header is the union of record keys in first-seen order; an empty array
//! produces the four canonical columns and no rows.

use crate::pipeline::record::RECORD_KEYS;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub type JsonRecord = Map<String, Value>;

pub const CSV_FILE: &str = "validated_info.csv";

pub const NO_RESULTS_MESSAGE: &str = "No validated information found.";

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Error loading JSON data: {error}")]
    Malformed {
        path: PathBuf,
        error: String,
        raw: String,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to print results: {0}")]
    Output(#[from] std::io::Error),
}

/// How a consume call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The artifact does not exist; nothing was written
    NoResults,
    Written { records: usize, csv_path: PathBuf },
}

/// Load the validated artifact. `Ok(None)` when the file does not exist.
pub fn load_validated(path: &Path) -> Result<Option<Vec<JsonRecord>>, ConsumerError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConsumerError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str::<Vec<JsonRecord>>(&raw)
        .map(Some)
        .map_err(|e| ConsumerError::Malformed {
            path: path.to_path_buf(),
            error: e.to_string(),
            raw,
        })
}

/// Header columns: keys in first-seen order across all records
pub fn csv_columns(records: &[JsonRecord]) -> Vec<String> {
    if records.is_empty() {
        return RECORD_KEYS.iter().map(|k| k.to_string()).collect();
    }

    let mut columns: Vec<String> = Vec::new();
    for key in records.iter().flat_map(|r| r.keys()) {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Encode records as CSV bytes
pub fn render_csv(records: &[JsonRecord]) -> Result<Vec<u8>, ConsumerError> {
    let columns = csv_columns(records);
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| cell_text(record.get(c))))?;
    }

    writer
        .into_inner()
        .map_err(|e| ConsumerError::Output(e.into_error()))
}

/// Write the CSV next to a temp file and rename it into place
pub fn write_csv(records: &[JsonRecord], path: &Path) -> Result<(), ConsumerError> {
    let body = render_csv(records)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.csv".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    let write_err = |source| ConsumerError::Write {
        path: path.to_path_buf(),
        source,
    };

    std::fs::write(&tmp, &body).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

/// Print the validated records and write them as CSV.
///
/// Messages for a missing or malformed artifact go to `out`, like the records
/// themselves. A malformed artifact is still an error for the caller.
pub fn consume<W: Write>(
    json_path: &Path,
    csv_path: &Path,
    out: &mut W,
) -> Result<ConsumeOutcome, ConsumerError> {
    let records = match load_validated(json_path) {
        Ok(Some(records)) => records,
        Ok(None) => {
            writeln!(out, "{NO_RESULTS_MESSAGE}")?;
            return Ok(ConsumeOutcome::NoResults);
        }
        Err(ConsumerError::Malformed { path, error, raw }) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            writeln!(out, "Error loading JSON data: {error}")?;
            writeln!(out, "Content of {name}:")?;
            writeln!(out, "{raw}")?;
            return Err(ConsumerError::Malformed { path, error, raw });
        }
        Err(e) => return Err(e),
    };

    let pretty = serde_json::to_string_pretty(&records)
        .map_err(|e| ConsumerError::Output(std::io::Error::other(e)))?;
    writeln!(out, "{pretty}")?;

    write_csv(&records, csv_path)?;
    info!(records = records.len(), path = %csv_path.display(), "CSV written");

    Ok(ConsumeOutcome::Written {
        records: records.len(),
        csv_path: csv_path.to_path_buf(),
    })
}
