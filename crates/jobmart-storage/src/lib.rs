//! Immutable raw snapshot storage + Postgres warehouse loading for jobmart.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use jobmart_core::{
    Warehouse, DIM_COMPANY, DIM_DATE, DIM_LOCATION, DIM_SKILL, FACT_JOB_POSTINGS,
    FACT_JOB_POSTING_SKILL,
};
use sha2::{Digest, Sha256};
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobmart-storage";

pub static MIGRATOR: Migrator = sqlx::migrate!();

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub content_hash: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    pub deduplicated: bool,
}

/// Hash-addressed store for the raw source bytes each run consumed.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn snapshot_relative_path(
        &self,
        run_date: NaiveDate,
        source_id: &str,
        content_hash: &str,
        extension: &str,
    ) -> PathBuf {
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        PathBuf::from(run_date.format("%Y%m%d").to_string())
            .join(source_id)
            .join(format!("{content_hash}.{ext}"))
    }

    /// Write `bytes` once under their content hash; rewrites of identical input are no-ops.
    pub async fn store_bytes(
        &self,
        run_date: NaiveDate,
        source_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredSnapshot> {
        let content_hash = sha256_hex(bytes);
        let relative_path =
            self.snapshot_relative_path(run_date, source_id, &content_hash, extension);
        let absolute_path = self.root.join(&relative_path);
        let snapshot = |deduplicated| StoredSnapshot {
            content_hash: content_hash.clone(),
            relative_path: relative_path.clone(),
            absolute_path: absolute_path.clone(),
            byte_size: bytes.len(),
            deduplicated,
        };

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("creating snapshot directory {}", parent.display()))?;

        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking snapshot path {}", absolute_path.display()))?
        {
            return Ok(snapshot(true));
        }

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &absolute_path).await {
            Ok(()) => Ok(snapshot(false)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = fs::remove_file(&temp_path).await;
                Ok(snapshot(true))
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "renaming temp snapshot {} -> {}",
                        temp_path.display(),
                        absolute_path.display()
                    )
                })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum WarehouseLoadError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("applying migrations: {0}")]
    Migrate(#[from] MigrateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub tables: Vec<(&'static str, usize)>,
}

impl LoadReport {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Warehouse tables in dependency order; truncation runs over all of them at once.
pub const WAREHOUSE_TABLES: [&str; 6] = [
    DIM_COMPANY,
    DIM_LOCATION,
    DIM_DATE,
    DIM_SKILL,
    FACT_JOB_POSTINGS,
    FACT_JOB_POSTING_SKILL,
];

pub fn truncate_statement() -> String {
    format!("TRUNCATE TABLE {}", WAREHOUSE_TABLES.join(", "))
}

#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub async fn connect(database_url: &str) -> Result<Self, WarehouseLoadError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), WarehouseLoadError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// Replace every warehouse table with `warehouse` inside one transaction.
    ///
    /// Any failure rolls the whole load back, leaving the previous run's tables intact.
    pub async fn replace_all(
        &self,
        warehouse: &Warehouse,
    ) -> Result<LoadReport, WarehouseLoadError> {
        let rows: usize = warehouse.row_counts().iter().map(|(_, n)| n).sum();
        let span = info_span!("warehouse_load", rows);
        async {
            let mut tx = self.pool.begin().await?;
            sqlx::query(&truncate_statement()).execute(&mut *tx).await?;
            insert_dimensions(&mut tx, warehouse).await?;
            insert_facts(&mut tx, warehouse).await?;
            tx.commit().await?;

            let report = LoadReport {
                tables: warehouse.row_counts(),
            };
            info!(total_rows = report.total_rows(), "warehouse tables replaced");
            Ok::<_, WarehouseLoadError>(report)
        }
        .instrument(span)
        .await
    }
}

pub const COMPANY_COLUMNS: &[&str] = &["company_id", "company_name", "company_url"];
pub const LOCATION_COLUMNS: &[&str] = &["location_id", "city", "governorate", "country"];
pub const DATE_COLUMNS: &[&str] = &["date_id", "year", "month", "day"];
pub const SKILL_COLUMNS: &[&str] = &["skill_id", "skill_name", "skill_type"];
pub const POSTING_COLUMNS: &[&str] = &[
    "posting_id",
    "date_id",
    "company_id",
    "location_id",
    "job_url",
    "job_title",
    "job_description",
    "employment_type",
    "job_flexibility",
];
pub const POSTING_SKILL_COLUMNS: &[&str] = &["posting_id", "skill_id"];

/// Insert column list per warehouse table, in `WAREHOUSE_TABLES` order.
pub const INSERT_COLUMNS: [(&str, &[&str]); 6] = [
    (DIM_COMPANY, COMPANY_COLUMNS),
    (DIM_LOCATION, LOCATION_COLUMNS),
    (DIM_DATE, DATE_COLUMNS),
    (DIM_SKILL, SKILL_COLUMNS),
    (FACT_JOB_POSTINGS, POSTING_COLUMNS),
    (FACT_JOB_POSTING_SKILL, POSTING_SKILL_COLUMNS),
];

pub fn insert_statement(table: &str, columns: &[&str]) -> String {
    let placeholders = (1..=columns.len())
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

async fn insert_dimensions(
    tx: &mut Transaction<'_, Postgres>,
    warehouse: &Warehouse,
) -> Result<(), sqlx::Error> {
    let stmt = insert_statement(DIM_COMPANY, COMPANY_COLUMNS);
    for company in &warehouse.dim_company {
        sqlx::query(&stmt)
            .bind(&company.company_id)
            .bind(&company.company_name)
            .bind(&company.company_url)
            .execute(&mut **tx)
            .await?;
    }
    let stmt = insert_statement(DIM_LOCATION, LOCATION_COLUMNS);
    for location in &warehouse.dim_location {
        sqlx::query(&stmt)
            .bind(&location.location_id)
            .bind(&location.city)
            .bind(&location.governorate)
            .bind(&location.country)
            .execute(&mut **tx)
            .await?;
    }
    let stmt = insert_statement(DIM_DATE, DATE_COLUMNS);
    for date in &warehouse.dim_date {
        sqlx::query(&stmt)
            .bind(date.date_id)
            .bind(date.year)
            .bind(date.month as i32)
            .bind(date.day as i32)
            .execute(&mut **tx)
            .await?;
    }
    let stmt = insert_statement(DIM_SKILL, SKILL_COLUMNS);
    for skill in &warehouse.dim_skill {
        sqlx::query(&stmt)
            .bind(&skill.skill_id)
            .bind(&skill.skill_name)
            .bind(skill.skill_type.as_str())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn insert_facts(
    tx: &mut Transaction<'_, Postgres>,
    warehouse: &Warehouse,
) -> Result<(), sqlx::Error> {
    let stmt = insert_statement(FACT_JOB_POSTINGS, POSTING_COLUMNS);
    for posting in &warehouse.fact_job_postings {
        sqlx::query(&stmt)
            .bind(&posting.posting_id)
            .bind(posting.date_id)
            .bind(&posting.company_id)
            .bind(&posting.location_id)
            .bind(&posting.job_url)
            .bind(&posting.job_title)
            .bind(&posting.job_description)
            .bind(&posting.employment_type)
            .bind(&posting.job_flexibility)
            .execute(&mut **tx)
            .await?;
    }
    let stmt = insert_statement(FACT_JOB_POSTING_SKILL, POSTING_SKILL_COLUMNS);
    for pair in &warehouse.fact_job_posting_skill {
        sqlx::query(&stmt)
            .bind(&pair.posting_id)
            .bind(&pair.skill_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 26).expect("date")
    }

    #[test]
    fn snapshot_hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn snapshot_path_is_date_source_hash() {
        let store = SnapshotStore::new("/tmp/artifacts");
        let rel = store.snapshot_relative_path(run_date(), "linkedin-daily", "abc", ".json");
        assert_eq!(rel, PathBuf::from("20250926/linkedin-daily/abc.json"));
        let rel = store.snapshot_relative_path(run_date(), "linkedin-daily", "abc", "");
        assert_eq!(rel, PathBuf::from("20250926/linkedin-daily/abc.bin"));
    }

    #[tokio::test]
    async fn identical_input_deduplicates_by_hash_path() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());

        let first = store
            .store_bytes(run_date(), "linkedin-daily", "json", b"[{\"company\":\"Acme\"}]")
            .await
            .expect("first store");
        let second = store
            .store_bytes(run_date(), "linkedin-daily", "json", b"[{\"company\":\"Acme\"}]")
            .await
            .expect("second store");

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(first.relative_path, second.relative_path);
        assert_eq!(
            std::fs::read(&first.absolute_path).expect("read snapshot"),
            b"[{\"company\":\"Acme\"}]"
        );
    }

    #[test]
    fn truncate_covers_every_warehouse_table() {
        let stmt = truncate_statement();
        for table in WAREHOUSE_TABLES {
            assert!(stmt.contains(table), "{table} missing from {stmt}");
        }
    }

    const MIGRATION: &str = include_str!("../migrations/0001_create_warehouse.sql");

    /// Body of one `CREATE TABLE` block in the migration.
    fn table_ddl(table: &str) -> &'static str {
        let header = format!("CREATE TABLE IF NOT EXISTS {table} (");
        let start = MIGRATION.find(&header).expect("table in migration") + header.len();
        let len = MIGRATION[start..].find("\n);").expect("closing paren");
        &MIGRATION[start..start + len]
    }

    fn ddl_columns(table: &str) -> Vec<&'static str> {
        table_ddl(table)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.split_whitespace().next())
            .collect()
    }

    #[test]
    fn insert_statement_numbers_placeholders() {
        assert_eq!(
            insert_statement(DIM_SKILL, SKILL_COLUMNS),
            "INSERT INTO dim_skill (skill_id, skill_name, skill_type) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn insert_columns_match_migration_columns() {
        let tables: Vec<_> = INSERT_COLUMNS.iter().map(|(table, _)| *table).collect();
        assert_eq!(tables, WAREHOUSE_TABLES);
        for (table, columns) in INSERT_COLUMNS {
            assert_eq!(ddl_columns(table), columns, "{table} columns drift from migration");
        }
    }

    #[test]
    fn colliding_hash_keys_fit_the_schema() {
        // "Cairo, , Egypt" and "Cairo, Egypt" stage to different triples with one digest.
        let id = jobmart_core::location_id(Some("Cairo"), None, Some("Egypt"));
        assert_eq!(id, jobmart_core::location_id(None, Some("Cairo"), Some("Egypt")));

        assert!(!MIGRATION.contains("UNIQUE"));
        for table in WAREHOUSE_TABLES.into_iter().filter(|t| *t != DIM_DATE) {
            assert!(
                !table_ddl(table).contains("PRIMARY KEY"),
                "{table} rejects duplicate hash keys"
            );
        }
    }

    #[test]
    fn migration_creates_every_warehouse_table() {
        for table in WAREHOUSE_TABLES {
            assert!(
                MIGRATION.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "{table} missing from migration"
            );
        }
    }
}
