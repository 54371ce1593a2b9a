//! Parquet snapshots of the warehouse tables.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Date32Array, Int32Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{Datelike, NaiveDate};
use jobmart_core::{
    Warehouse, DIM_COMPANY, DIM_DATE, DIM_LOCATION, DIM_SKILL, FACT_JOB_POSTINGS,
    FACT_JOB_POSTING_SKILL,
};
use jobmart_storage::sha256_hex;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub rows: usize,
    pub sha256: String,
    pub bytes: u64,
}

fn date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn utf8(name: &str, nullable: bool) -> ArrowField {
    ArrowField::new(name, DataType::Utf8, nullable)
}

fn strings<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

pub fn company_batch(warehouse: &Warehouse) -> Result<RecordBatch> {
    let rows = &warehouse.dim_company;
    let schema = Schema::new(vec![
        utf8("company_id", false),
        utf8("company_name", true),
        utf8("company_url", true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(rows.iter().map(|r| Some(r.company_id.as_str()))),
            strings(rows.iter().map(|r| r.company_name.as_deref())),
            strings(rows.iter().map(|r| r.company_url.as_deref())),
        ],
    )
    .context("building dim_company record batch")
}

pub fn location_batch(warehouse: &Warehouse) -> Result<RecordBatch> {
    let rows = &warehouse.dim_location;
    let schema = Schema::new(vec![
        utf8("location_id", false),
        utf8("city", true),
        utf8("governorate", true),
        utf8("country", true),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(rows.iter().map(|r| Some(r.location_id.as_str()))),
            strings(rows.iter().map(|r| r.city.as_deref())),
            strings(rows.iter().map(|r| r.governorate.as_deref())),
            strings(rows.iter().map(|r| r.country.as_deref())),
        ],
    )
    .context("building dim_location record batch")
}

pub fn date_batch(warehouse: &Warehouse) -> Result<RecordBatch> {
    let rows = &warehouse.dim_date;
    let schema = Schema::new(vec![
        ArrowField::new("date_id", DataType::Date32, false),
        ArrowField::new("year", DataType::Int32, false),
        ArrowField::new("month", DataType::UInt32, false),
        ArrowField::new("day", DataType::UInt32, false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Date32Array::from(rows.iter().map(|r| date32(r.date_id)).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(rows.iter().map(|r| r.year).collect::<Vec<_>>())),
            Arc::new(UInt32Array::from(rows.iter().map(|r| r.month).collect::<Vec<_>>())),
            Arc::new(UInt32Array::from(rows.iter().map(|r| r.day).collect::<Vec<_>>())),
        ],
    )
    .context("building dim_date record batch")
}

pub fn skill_batch(warehouse: &Warehouse) -> Result<RecordBatch> {
    let rows = &warehouse.dim_skill;
    let schema = Schema::new(vec![
        utf8("skill_id", false),
        utf8("skill_name", false),
        utf8("skill_type", false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(rows.iter().map(|r| Some(r.skill_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.skill_name.as_str()))),
            strings(rows.iter().map(|r| Some(r.skill_type.as_str()))),
        ],
    )
    .context("building dim_skill record batch")
}

pub fn posting_batch(warehouse: &Warehouse) -> Result<RecordBatch> {
    let rows = &warehouse.fact_job_postings;
    let schema = Schema::new(vec![
        utf8("posting_id", false),
        ArrowField::new("date_id", DataType::Date32, false),
        utf8("company_id", false),
        utf8("location_id", false),
        utf8("job_url", true),
        utf8("job_title", true),
        utf8("job_description", false),
        utf8("employment_type", true),
        utf8("job_flexibility", false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(rows.iter().map(|r| Some(r.posting_id.as_str()))),
            Arc::new(Date32Array::from(rows.iter().map(|r| date32(r.date_id)).collect::<Vec<_>>())),
            strings(rows.iter().map(|r| Some(r.company_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.location_id.as_str()))),
            strings(rows.iter().map(|r| r.job_url.as_deref())),
            strings(rows.iter().map(|r| r.job_title.as_deref())),
            strings(rows.iter().map(|r| Some(r.job_description.as_str()))),
            strings(rows.iter().map(|r| r.employment_type.as_deref())),
            strings(rows.iter().map(|r| Some(r.job_flexibility.as_str()))),
        ],
    )
    .context("building fact_job_postings record batch")
}

pub fn posting_skill_batch(warehouse: &Warehouse) -> Result<RecordBatch> {
    let rows = &warehouse.fact_job_posting_skill;
    let schema = Schema::new(vec![utf8("posting_id", false), utf8("skill_id", false)]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(rows.iter().map(|r| Some(r.posting_id.as_str()))),
            strings(rows.iter().map(|r| Some(r.skill_id.as_str()))),
        ],
    )
    .context("building fact_job_posting_skill record batch")
}

/// Write one parquet file per table under `snapshot_dir` and a `manifest.json` beside them.
pub fn export_warehouse(snapshot_dir: &Path, warehouse: &Warehouse) -> Result<PathBuf> {
    std::fs::create_dir_all(snapshot_dir)
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let builders: [(&str, fn(&Warehouse) -> Result<RecordBatch>); 6] = [
        (DIM_COMPANY, company_batch),
        (DIM_LOCATION, location_batch),
        (DIM_DATE, date_batch),
        (DIM_SKILL, skill_batch),
        (FACT_JOB_POSTINGS, posting_batch),
        (FACT_JOB_POSTING_SKILL, posting_skill_batch),
    ];

    let mut files = Vec::with_capacity(builders.len());
    for (name, build) in builders {
        let batch = build(warehouse)?;
        let rows = batch.num_rows();
        let path = snapshot_dir.join(format!("{name}.parquet"));
        write_parquet(&path, batch)?;
        files.push(manifest_entry(name, snapshot_dir, &path, rows)?);
    }

    let manifest = ParquetManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        files,
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    std::fs::write(&manifest_path, bytes)
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn manifest_entry(
    name: &str,
    base: &Path,
    path: &Path,
    rows: usize,
) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rel = path.strip_prefix(base).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        rows,
        sha256: sha256_hex(&bytes),
        bytes: bytes.len() as u64,
    })
}
