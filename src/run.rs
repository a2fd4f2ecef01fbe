use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;

use crate::archive::MigrationReport;
use crate::backup;
use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::metrics::{area_metrics, month_metrics, MetricsRow};
use crate::record::Sheet;
use crate::storage::repository::{self, RunOutcome};
use crate::storage::Database;

/// Options controlling one daily pass.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Reference date; today (local time) when unset.
    pub as_of: Option<NaiveDate>,
    /// Snapshot the store before touching it.
    pub backup: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            as_of: None,
            backup: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// Report returned after a daily pass completes.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: i64,
    pub status: RunStatus,
    pub migration: MigrationReport,
    pub backup_path: Option<PathBuf>,
    pub run_time_ms: i64,
    pub area_metrics: Vec<MetricsRow>,
    pub month_metrics: Vec<MetricsRow>,
}

/// Everything the transactional step produces.
struct PassResult {
    migration: MigrationReport,
    area: Vec<MetricsRow>,
    month: Vec<MetricsRow>,
}

/// Backup, migrate, aggregate and persist, logging the run.
///
/// The reference date is fixed once up front and used for every archive
/// decision of the pass. The backup is named after the day the run actually
/// happens, so a back-dated run never replaces an older snapshot. Loading, migration and both metrics tables are
/// written inside one transaction, so a failure leaves the previous
/// tracker state untouched.
pub async fn run_daily(db: &Database, options: &RunOptions) -> Result<RunReport> {
    let started = Instant::now();
    let run_date = chrono::Local::now().date_naive();
    let reference_date = options.as_of.unwrap_or(run_date);
    log::info!("Starting daily run for {reference_date}");

    let config = db
        .reader()
        .call(|conn| Ok::<_, rusqlite::Error>(TrackerConfig::load(conn)))
        .await??;

    let run_id = db
        .writer()
        .call(move |conn| repository::insert_run(conn, reference_date))
        .await?;

    let outcome = execute(db, options, &config, reference_date, run_date).await;
    let run_time_ms = started.elapsed().as_millis() as i64;

    match outcome {
        Ok((pass, backup_path)) => {
            let backup_str = backup_path.as_ref().map(|p| p.display().to_string());
            let migration = pass.migration;
            let (area_groups, month_groups) = (pass.area.len(), pass.month.len());
            db.writer()
                .call(move |conn| {
                    repository::complete_run(
                        conn,
                        run_id,
                        &RunOutcome {
                            status: RunStatus::Completed.as_str(),
                            migration: Some(&migration),
                            area_groups: Some(area_groups),
                            month_groups: Some(month_groups),
                            run_time_ms,
                            backup_path: backup_str.as_deref(),
                            error_message: None,
                        },
                    )
                })
                .await?;
            log::info!(
                "Run {run_id} finished in {run_time_ms} ms: {area_groups} areas, {month_groups} months"
            );
            Ok(RunReport {
                run_id,
                status: RunStatus::Completed,
                migration: pass.migration,
                backup_path,
                run_time_ms,
                area_metrics: pass.area,
                month_metrics: pass.month,
            })
        }
        Err(e) => {
            log::error!("Run {run_id} failed: {e}");
            let message = e.to_string();
            let logged = db
                .writer()
                .call(move |conn| {
                    repository::complete_run(
                        conn,
                        run_id,
                        &RunOutcome {
                            status: RunStatus::Failed.as_str(),
                            run_time_ms,
                            error_message: Some(&message),
                            ..Default::default()
                        },
                    )
                })
                .await;
            if let Err(log_err) = logged {
                log::warn!("Could not record failure of run {run_id}: {log_err}");
            }
            Err(e)
        }
    }
}

async fn execute(
    db: &Database,
    options: &RunOptions,
    config: &TrackerConfig,
    reference_date: NaiveDate,
    run_date: NaiveDate,
) -> Result<(PassResult, Option<PathBuf>)> {
    let backup_path = if !options.backup {
        log::info!("Backup disabled for this run");
        None
    } else {
        match &config.backup_dir {
            Some(root) => Some(backup::write_backup(db, root, run_date).await?),
            None => {
                log::warn!("No backup directory configured; skipping backup");
                None
            }
        }
    };

    let policy = config.archive_policy;
    let years = config.years;
    let pass = db
        .writer()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let active = repository::load_record_set(&tx, Sheet::Active)?;
            let archive = repository::load_record_set(&tx, Sheet::Archive)?;

            let migration = policy.migrate(active, archive, reference_date);

            let area = area_metrics(&migration.active, &migration.archive);
            let month = month_metrics(&migration.active, &migration.archive, years);
            log::debug!(
                "Computed {} area rows and {} month rows",
                area.len(),
                month.len()
            );

            repository::replace_record_set(&tx, Sheet::Active, &migration.active)?;
            repository::replace_record_set(&tx, Sheet::Archive, &migration.archive)?;
            repository::replace_area_metrics(&tx, &area)?;
            repository::replace_month_metrics(&tx, &month, &years)?;
            tx.commit()?;

            Ok::<_, rusqlite::Error>(PassResult {
                migration: migration.report,
                area,
                month,
            })
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok((pass, backup_path))
}
