//! Warehouse build pipeline: staging, dimensional modeling, export and load.

pub mod bridge;
pub mod dimensions;
pub mod export;
pub mod fact;
pub mod quality;
pub mod staging;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use jobmart_adapters::{merge_by_job_link, FileSource, RawFormat, RawSource};
use jobmart_core::{RawPosting, StagedPosting, Warehouse, DEFAULT_SKILL_SEPARATOR};
use jobmart_storage::{PgWarehouse, SnapshotStore};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::quality::QualityReport;

pub use jobmart_core::FACT_JOB_POSTINGS;

pub const CRATE_NAME: &str = "jobmart-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    /// Inferred from the file extension when omitted.
    #[serde(default)]
    pub format: Option<RawFormat>,
    pub path: PathBuf,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceConfig {
    pub fn resolved_format(&self) -> Option<RawFormat> {
        self.format.or_else(|| RawFormat::from_path(&self.path))
    }
}

pub fn source_for_config(source: &SourceConfig, workspace_root: &Path) -> Result<FileSource> {
    let format = source.resolved_format().with_context(|| {
        format!(
            "source {} has no format and {} has no recognised extension",
            source.source_id,
            source.path.display()
        )
    })?;
    Ok(FileSource::new(
        source.source_id.clone(),
        workspace_root.join(&source.path),
        format,
    ))
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: Option<String>,
    pub artifacts_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub skill_separator: String,
    pub run_date: Option<NaiveDate>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let workspace_root = std::env::var("JOBMART_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let run_date = match std::env::var("JOBMART_RUN_DATE") {
            Ok(value) if !value.trim().is_empty() => Some(
                NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                    .with_context(|| format!("parsing JOBMART_RUN_DATE={value}"))?,
            ),
            _ => None,
        };
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("artifacts")),
            skill_separator: std::env::var("JOBMART_SKILL_SEPARATOR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SKILL_SEPARATOR.to_string()),
            workspace_root,
            run_date,
        })
    }

    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let workspace_root = root.into();
        Self {
            database_url: None,
            artifacts_dir: workspace_root.join("artifacts"),
            workspace_root,
            skill_separator: DEFAULT_SKILL_SEPARATOR.to_string(),
            run_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOptions {
    pub run_date: NaiveDate,
    pub skill_separator: String,
}

impl TransformOptions {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            skill_separator: DEFAULT_SKILL_SEPARATOR.to_string(),
        }
    }
}

pub fn build_warehouse(staged: &[StagedPosting], skill_separator: &str) -> Warehouse {
    Warehouse {
        dim_company: dimensions::build_companies(staged),
        dim_location: dimensions::build_locations(staged),
        dim_date: dimensions::build_dates(staged),
        dim_skill: dimensions::build_skills(staged, skill_separator),
        fact_job_postings: fact::build_fact(staged),
        fact_job_posting_skill: bridge::build_bridge(staged, skill_separator),
    }
}

/// Raw rows in, all six tables out. Same input and options always yield the same tables.
pub fn transform(raw: &[RawPosting], options: &TransformOptions) -> Warehouse {
    transform_counted(raw, options).0
}

/// `transform` plus the number of rows that survived staging.
fn transform_counted(raw: &[RawPosting], options: &TransformOptions) -> (Warehouse, usize) {
    let span = info_span!("transform", run_date = %options.run_date, raw_rows = raw.len());
    let _guard = span.enter();
    let staged = staging::stage_all(raw, options.run_date);
    debug!(
        staged = staged.len(),
        dropped = raw.len() - staged.len(),
        "staged raw postings"
    );
    (build_warehouse(&staged, &options.skill_separator), staged.len())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRunRecord {
    pub source_id: String,
    pub rows: usize,
    pub snapshot_path: String,
    pub content_hash: String,
    pub deduplicated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub sources: Vec<SourceRunRecord>,
    pub raw_rows: usize,
    pub merged_rows: usize,
    pub staged_rows: usize,
    pub tables: BTreeMap<String, usize>,
    pub quality: QualityReport,
    pub warehouse_loaded: bool,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

pub struct PipelineRunner {
    config: PipelineConfig,
    snapshots: SnapshotStore,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        let snapshots = SnapshotStore::new(config.artifacts_dir.clone());
        Self { config, snapshots }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_once(&self, run_date: NaiveDate) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, %run_date);
        self.run_inner(run_id, run_date).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, run_date: NaiveDate) -> Result<RunSummary> {
        let started_at = Utc::now();
        let registry = self.load_source_registry().await?;
        let enabled_sources: Vec<_> = registry.sources.into_iter().filter(|s| s.enabled).collect();

        let mut records = Vec::with_capacity(enabled_sources.len());
        let mut batches = Vec::with_capacity(enabled_sources.len());
        for source in &enabled_sources {
            let (record, rows) = self
                .ingest_source(source, run_date)
                .instrument(info_span!("source", source_id = %source.source_id))
                .await?;
            records.push(record);
            batches.push(rows);
        }

        let raw_rows: usize = batches.iter().map(Vec::len).sum();
        let merged = merge_by_job_link(batches);
        let options = TransformOptions {
            run_date,
            skill_separator: self.config.skill_separator.clone(),
        };
        let (warehouse, staged_rows) = transform_counted(&merged, &options);

        let quality = quality::audit(&warehouse);
        quality.log_findings();

        // The load precedes every write under reports/.
        let warehouse_loaded = match &self.config.database_url {
            Some(url) => {
                let db = PgWarehouse::connect(url)
                    .await
                    .context("connecting to warehouse database")?;
                db.migrate().await.context("migrating warehouse schema")?;
                let load = db
                    .replace_all(&warehouse)
                    .await
                    .context("loading warehouse tables")?;
                for (table, rows) in &load.tables {
                    debug!(table = %table, rows, "loaded warehouse table");
                }
                true
            }
            None => false,
        };

        let reports_dir = self
            .config
            .workspace_root
            .join("reports")
            .join(run_id.to_string());
        let manifest_path = export::export_warehouse(&reports_dir.join("snapshots"), &warehouse)?;

        let summary = RunSummary {
            run_id,
            run_date,
            started_at,
            finished_at: Utc::now(),
            enabled_sources: enabled_sources.len(),
            sources: records,
            raw_rows,
            merged_rows: merged.len(),
            staged_rows,
            tables: warehouse
                .row_counts()
                .into_iter()
                .map(|(name, n)| (name.to_string(), n))
                .collect(),
            quality,
            warehouse_loaded,
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        };
        write_reports(&reports_dir, &summary).await?;

        info!(
            staged = summary.staged_rows,
            postings = warehouse.fact_job_postings.len(),
            warehouse_loaded,
            "pipeline run complete"
        );
        Ok(summary)
    }

    async fn ingest_source(
        &self,
        source: &SourceConfig,
        run_date: NaiveDate,
    ) -> Result<(SourceRunRecord, Vec<RawPosting>)> {
        let adapter = source_for_config(source, &self.config.workspace_root)?;
        let bytes = adapter
            .read_bytes()
            .await
            .with_context(|| format!("reading source {}", source.source_id))?;
        let stored = self
            .snapshots
            .store_bytes(run_date, &source.source_id, adapter.format().extension(), &bytes)
            .await?;
        let rows = adapter
            .parse(&bytes)
            .with_context(|| format!("parsing source {}", source.source_id))?;
        debug!(rows = rows.len(), deduplicated = stored.deduplicated, "ingested source");

        let record = SourceRunRecord {
            source_id: source.source_id.clone(),
            rows: rows.len(),
            snapshot_path: stored.relative_path.display().to_string(),
            content_hash: stored.content_hash,
            deduplicated: stored.deduplicated,
        };
        Ok((record, rows))
    }

    async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.workspace_root.join("sources.yaml");
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

async fn write_reports(reports_dir: &Path, summary: &RunSummary) -> Result<()> {
    fs::create_dir_all(reports_dir)
        .await
        .with_context(|| format!("creating {}", reports_dir.display()))?;

    let summary_json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(reports_dir.join("run_summary.json"), summary_json)
        .await
        .context("writing run_summary.json")?;

    fs::write(reports_dir.join("daily_brief.md"), daily_brief(summary))
        .await
        .context("writing daily_brief.md")?;
    Ok(())
}

fn daily_brief(summary: &RunSummary) -> String {
    let sources = summary
        .sources
        .iter()
        .map(|s| format!("- {}: {} rows", s.source_id, s.rows))
        .collect::<Vec<_>>()
        .join("\n");
    let tables = summary
        .tables
        .iter()
        .map(|(name, n)| format!("| {name} | {n} |"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# Job Postings Warehouse Brief\n\n- Run ID: `{}`\n- Run date: {}\n- Started: {}\n- Finished: {}\n- Raw rows: {} (merged {}, staged {})\n- Quality: {}\n- Warehouse loaded: {}\n\n## Sources\n{}\n\n## Tables\n| table | rows |\n|---|---|\n{}\n",
        summary.run_id,
        summary.run_date,
        summary.started_at,
        summary.finished_at,
        summary.raw_rows,
        summary.merged_rows,
        summary.staged_rows,
        if summary.quality.is_clean() { "clean" } else { "findings logged" },
        summary.warehouse_loaded,
        sources,
        tables,
    )
}

/// Resolve the processing date at the edge: explicit override, then `JOBMART_RUN_DATE`, then today (UTC).
pub async fn run_once_from_env(run_date: Option<NaiveDate>) -> Result<RunSummary> {
    let config = PipelineConfig::from_env()?;
    let run_date = run_date
        .or(config.run_date)
        .unwrap_or_else(|| Utc::now().date_naive());
    PipelineRunner::new(config).run_once(run_date).await
}

pub async fn migrate_from_env() -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let url = config
        .database_url
        .context("DATABASE_URL must be set to run migrations")?;
    let db = PgWarehouse::connect(&url)
        .await
        .context("connecting to warehouse database")?;
    db.migrate().await.context("migrating warehouse schema")?;
    Ok(())
}

pub fn report_recent_runs(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Job Postings Warehouse Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let summary_path = dir.path().join("run_summary.json");
        let manifest_path = dir.path().join("snapshots").join("manifest.json");
        if !summary_path.exists() {
            continue;
        }

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;
        let run_date = summary
            .get("run_date")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let postings = summary
            .get("tables")
            .and_then(|t| t.get(FACT_JOB_POSTINGS))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let loaded = summary
            .get("warehouse_loaded")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- run date: {run_date}"));
        lines.push(format!("- postings: {postings}"));
        lines.push(format!("- warehouse loaded: {loaded}"));
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}
