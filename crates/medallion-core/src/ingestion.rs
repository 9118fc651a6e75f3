//! Bronze-layer ingestion: enumerate supported files in a source directory,
//! parse and schema-validate each one, and concatenate the survivors into a
//! single frame. One bad file never aborts the run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::schema::{validate, TableSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Accepted,
    ParseFailed,
    SchemaRejected,
}

#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub hash: Option<String>,
    pub status: FileStatus,
    pub rows: usize,
    pub detail: Option<String>,
    /// Set when the lineage copy failed; the file's data stays in the batch.
    pub copy_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub formats: Vec<FileFormat>,
    /// Accepted source files are copied here byte-for-byte under their
    /// original names, when set.
    pub lineage_dir: Option<PathBuf>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            formats: vec![FileFormat::Csv, FileFormat::Json],
            lineage_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct IngestionBatch {
    pub frame: DataFrame,
    pub reports: Vec<FileReport>,
    /// True when the input directory was absent; the caller decides whether
    /// to halt the pipeline.
    pub source_missing: bool,
}

/// Reads every supported file under `input_dir`, validates each against the
/// schema and returns the concatenation of the accepted frames in
/// file-processing order. Enumeration order within one extension follows the
/// filesystem and is not guaranteed stable across platforms.
pub fn ingest(
    input_dir: &Path,
    schema: &TableSchema,
    options: &IngestOptions,
) -> Result<IngestionBatch> {
    if !input_dir.is_dir() {
        error!(path = %input_dir.display(), "input directory does not exist");
        return Ok(IngestionBatch {
            frame: DataFrame::default(),
            reports: Vec::new(),
            source_missing: true,
        });
    }

    let mut frames = Vec::new();
    let mut reports = Vec::new();

    for format in &options.formats {
        let pattern = input_dir.join(format!("*.{}", format.extension()));
        for entry in glob::glob(&pattern.to_string_lossy())? {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!(%err, "could not read path from glob pattern");
                    continue;
                }
            };

            let contents = match fs::read(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to read file; skipping");
                    reports.push(FileReport {
                        path,
                        hash: None,
                        status: FileStatus::ParseFailed,
                        rows: 0,
                        detail: Some(err.to_string()),
                        copy_error: None,
                    });
                    continue;
                }
            };
            let hash = blake3::hash(&contents).to_hex().to_string();

            let parsed = match *format {
                FileFormat::Csv => parse_csv(&contents),
                FileFormat::Json => parse_ndjson(&contents),
            };
            let parsed = match parsed {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to parse file; skipping");
                    reports.push(FileReport {
                        path,
                        hash: Some(hash),
                        status: FileStatus::ParseFailed,
                        rows: 0,
                        detail: Some(err.to_string()),
                        copy_error: None,
                    });
                    continue;
                }
            };

            let validated = match validate(&parsed, schema) {
                Ok(validated) => validated,
                Err(err) => {
                    warn!(path = %path.display(), %err, "schema validation failed; skipping");
                    reports.push(FileReport {
                        path,
                        hash: Some(hash),
                        status: FileStatus::SchemaRejected,
                        rows: 0,
                        detail: Some(err.to_string()),
                        copy_error: None,
                    });
                    continue;
                }
            };
            for (column, nulls) in &validated.coerced_nulls {
                warn!(path = %path.display(), column, nulls, "values nulled by type coercion");
            }

            let copy_error = options
                .lineage_dir
                .as_deref()
                .and_then(|lineage| copy_for_lineage(&path, lineage).err())
                .map(|err| {
                    warn!(path = %path.display(), %err, "lineage copy failed");
                    err.to_string()
                });

            info!(path = %path.display(), rows = validated.frame.height(), "file accepted");
            reports.push(FileReport {
                path,
                hash: Some(hash),
                status: FileStatus::Accepted,
                rows: validated.frame.height(),
                detail: None,
                copy_error,
            });
            frames.push(validated.frame);
        }
    }

    if frames.is_empty() {
        warn!(path = %input_dir.display(), "no files accepted; returning empty dataset");
    }
    let frame = concat_frames(frames)?;

    Ok(IngestionBatch {
        frame,
        reports,
        source_missing: false,
    })
}

fn copy_for_lineage(path: &Path, lineage_dir: &Path) -> std::io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "source path has no file name")
    })?;
    fs::create_dir_all(lineage_dir)?;
    fs::copy(path, lineage_dir.join(file_name))?;
    Ok(())
}

/// Parses a header-rowed, comma-delimited CSV into an all-string frame.
/// Empty cells and ragged-row gaps become nulls.
fn parse_csv(contents: &[u8]) -> Result<DataFrame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(contents);

    let headers = reader.headers()?.clone();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (index, values) in columns.iter_mut().enumerate() {
            let cell = record.get(index).filter(|value| !value.is_empty());
            values.push(cell.map(|value| value.to_string()));
        }
    }

    let series: Vec<Column> = headers
        .iter()
        .zip(columns)
        .map(|(name, values)| Series::new(name.into(), values).into())
        .collect();
    Ok(DataFrame::new(series)?)
}

/// Parses newline-delimited JSON objects. The column set is the union of the
/// keys in first-seen order; scalar values are stringified, nulls stay null.
fn parse_ndjson(contents: &[u8]) -> Result<DataFrame> {
    let text = std::str::from_utf8(contents)
        .map_err(|_| PipelineError::Processing("file contents were not valid UTF-8".to_string()))?;

    let mut keys: Vec<String> = Vec::new();
    let mut records: Vec<serde_json::Map<String, Value>> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record: serde_json::Map<String, Value> = serde_json::from_str(line)?;
        for key in record.keys() {
            if !keys.iter().any(|existing| existing == key) {
                keys.push(key.clone());
            }
        }
        records.push(record);
    }

    let series: Vec<Column> = keys
        .iter()
        .map(|key| {
            let values: Vec<Option<String>> = records
                .iter()
                .map(|record| record.get(key).and_then(json_cell))
                .collect();
            Series::new(key.as_str().into(), values).into()
        })
        .collect();
    Ok(DataFrame::new(series)?)
}

fn json_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}

/// Vertically stacks frames over the union of their columns, filling cells
/// absent from a frame with nulls. Per-frame row order is preserved.
fn concat_frames(frames: Vec<DataFrame>) -> Result<DataFrame> {
    if frames.is_empty() {
        return Ok(DataFrame::default());
    }

    let mut names: Vec<String> = Vec::new();
    let mut dtypes: HashMap<String, DataType> = HashMap::new();
    for frame in &frames {
        for column in frame.get_columns() {
            let name = column.name().to_string();
            if !dtypes.contains_key(&name) {
                dtypes.insert(name.clone(), column.dtype().clone());
                names.push(name);
            }
        }
    }

    let mut combined: Option<DataFrame> = None;
    for frame in frames {
        let mut aligned = frame;
        for name in &names {
            if aligned.column(name).is_err() {
                let filler =
                    Series::full_null(name.as_str().into(), aligned.height(), &dtypes[name]);
                aligned.with_column(filler)?;
            }
        }
        let aligned = aligned.select(names.iter().map(String::as_str))?;
        match combined.as_mut() {
            None => combined = Some(aligned),
            Some(base) => base.vstack_mut(&aligned).map(|_| ())?,
        }
    }

    Ok(combined.unwrap_or_default())
}
