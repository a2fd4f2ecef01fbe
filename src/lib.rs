pub mod archive;
pub mod backup;
pub mod config;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod record;
pub mod report;
pub mod run;
pub mod storage;

pub use archive::{ArchivePolicy, Migration, MigrationReport};
pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use metrics::{GroupDimension, MetricValue, MetricsRow, SupportedYears};
pub use record::{CellValue, Column, JobRecord, Sheet};
pub use run::{RunOptions, RunReport, RunStatus};
pub use storage::Database;

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::RunLogEntry;

use serde::Serialize;
use storage::repository;

/// Row counts and freshness of the stored tracker.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub active_rows: usize,
    pub archive_rows: usize,
    pub area_groups: usize,
    pub month_groups: usize,
    pub metrics_computed_at: Option<String>,
    pub last_run: Option<RunLogEntry>,
}

/// Main entry point for the fiber install tracker.
pub struct FiberTracker {
    db: Database,
}

impl FiberTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run the daily archive-and-aggregate pass.
    pub async fn run_daily(&self, options: &RunOptions) -> Result<RunReport> {
        run::run_daily(&self.db, options).await
    }

    /// Load rows into a sheet, either replacing it or appending after its last row.
    /// Returns the sheet's row count afterwards.
    pub async fn import(&self, sheet: Sheet, records: Vec<JobRecord>, replace: bool) -> Result<usize> {
        let incoming = records.len();
        let count = self
            .db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                if replace {
                    repository::replace_record_set(&tx, sheet, &records)?;
                } else {
                    repository::append_records(&tx, sheet, &records)?;
                }
                let count = repository::count_records(&tx, sheet)?;
                tx.commit()?;
                Ok::<usize, rusqlite::Error>(count)
            })
            .await?;
        log::info!(
            "Imported {incoming} rows into {sheet} ({}); {count} rows now",
            if replace { "replaced" } else { "appended" }
        );
        Ok(count)
    }

    /// Import a JSON array of row objects keyed by workbook headers.
    pub async fn import_json(&self, sheet: Sheet, json: &str, replace: bool) -> Result<usize> {
        let records = record::parse_record_set(json)?;
        self.import(sheet, records, replace).await
    }

    /// All rows of a sheet, in order.
    pub async fn export(&self, sheet: Sheet) -> Result<Vec<JobRecord>> {
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::load_record_set(conn, sheet))
            .await?)
    }

    /// A sheet as a JSON array of row objects keyed by workbook headers.
    pub async fn export_json(&self, sheet: Sheet) -> Result<String> {
        let rows: Vec<serde_json::Value> = self
            .export(sheet)
            .await?
            .iter()
            .map(JobRecord::to_json_row)
            .collect();
        Ok(serde_json::to_string_pretty(&rows)?)
    }

    /// The metrics table as written by the last run.
    pub async fn metrics(&self, dimension: GroupDimension) -> Result<Vec<MetricsRow>> {
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::load_metrics(conn, dimension))
            .await?)
    }

    pub async fn status(&self) -> Result<TrackerStatus> {
        Ok(self
            .db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>(TrackerStatus {
                    active_rows: repository::count_records(conn, Sheet::Active)?,
                    archive_rows: repository::count_records(conn, Sheet::Archive)?,
                    area_groups: repository::load_metrics(conn, GroupDimension::Area)?.len(),
                    month_groups: repository::load_metrics(conn, GroupDimension::Month)?.len(),
                    metrics_computed_at: repository::metrics_computed_at(
                        conn,
                        GroupDimension::Area,
                    )?,
                    last_run: repository::list_runs(conn, 1)?.into_iter().next(),
                })
            })
            .await?)
    }

    /// Most recent runs first.
    pub async fn runs(&self, limit: usize) -> Result<Vec<RunLogEntry>> {
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::list_runs(conn, limit))
            .await?)
    }

    // ── Configuration ────────────────────────────────────────────

    /// Effective settings, defaults included.
    pub async fn config(&self) -> Result<TrackerConfig> {
        self.db
            .reader()
            .call(|conn| Ok::<_, rusqlite::Error>(TrackerConfig::load(conn)))
            .await?
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?)
    }

    /// Store a setting after checking it is one the tracker understands and
    /// that the resulting configuration still loads.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.db
            .writer()
            .call(move |conn| Ok::<_, rusqlite::Error>(config::store_setting(conn, &key, &value)))
            .await?
    }

    /// Explicitly stored settings only.
    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?)
    }
}
