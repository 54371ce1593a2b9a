//! Raw source adapter contracts + file-backed implementations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobmart_core::{text_or_none, RawPosting};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

pub const CRATE_NAME: &str = "jobmart-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFormat {
    /// A JSON array of records keyed by raw column name.
    Json,
    JsonLines,
    Csv,
}

impl RawFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RawFormat::Json => "json",
            RawFormat::JsonLines => "jsonl",
            RawFormat::Csv => "csv",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(RawFormat::Json),
            "jsonl" | "ndjson" => Some(RawFormat::JsonLines),
            "csv" => Some(RawFormat::Csv),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding json records: {0}")]
    Json(#[from] serde_json::Error),
    #[error("decoding json line {line}: {source}")]
    JsonLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("json lines input is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("decoding csv records: {0}")]
    Csv(#[from] csv::Error),
}

#[async_trait]
pub trait RawSource: Send + Sync {
    fn source_id(&self) -> &str;
    fn format(&self) -> RawFormat;

    async fn read_bytes(&self) -> Result<Vec<u8>, AdapterError>;

    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawPosting>, AdapterError> {
        parse_raw_records(self.format(), bytes)
    }
}

#[derive(Debug, Clone)]
pub struct FileSource {
    source_id: String,
    path: PathBuf,
    format: RawFormat,
}

impl FileSource {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>, format: RawFormat) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RawSource for FileSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn format(&self) -> RawFormat {
        self.format
    }

    async fn read_bytes(&self) -> Result<Vec<u8>, AdapterError> {
        fs::read(&self.path).await.map_err(|source| AdapterError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

pub fn parse_raw_records(format: RawFormat, bytes: &[u8]) -> Result<Vec<RawPosting>, AdapterError> {
    let rows = match format {
        RawFormat::Json => serde_json::from_slice::<Vec<RawPosting>>(bytes)?,
        RawFormat::JsonLines => parse_json_lines(bytes)?,
        RawFormat::Csv => parse_csv(bytes)?,
    };
    debug!(?format, rows = rows.len(), "decoded raw records");
    Ok(rows)
}

fn parse_json_lines(bytes: &[u8]) -> Result<Vec<RawPosting>, AdapterError> {
    let text = std::str::from_utf8(bytes)?;
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(line)
            .map_err(|source| AdapterError::JsonLine { line: idx + 1, source })?;
        rows.push(row);
    }
    Ok(rows)
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RawPosting>, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    reader
        .deserialize::<RawPosting>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(AdapterError::from)
}

/// Fold source batches into one raw table keyed on `job_link`.
///
/// Each batch replaces earlier rows that share one of its job links; replaced
/// rows move to the end with the batch. Rows without a job link are never
/// replaced.
pub fn merge_by_job_link(batches: impl IntoIterator<Item = Vec<RawPosting>>) -> Vec<RawPosting> {
    let mut merged: Vec<RawPosting> = Vec::new();
    for batch in batches {
        let incoming: HashSet<String> = batch
            .iter()
            .filter_map(|row| text_or_none(row.job_link.as_deref()))
            .collect();
        if !incoming.is_empty() {
            merged.retain(|row| match text_or_none(row.job_link.as_deref()) {
                Some(link) => !incoming.contains(&link),
                None => true,
            });
        }
        merged.extend(batch);
    }
    merged
}
