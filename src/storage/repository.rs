use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::archive::MigrationReport;
use crate::date_util::month_label;
use crate::metrics::{GroupDimension, MetricsRow, MonthKey, SupportedYears};
use crate::record::{CellValue, Column, JobRecord, Sheet};

// ── Job records ────────────────────────────────────────────────────

/// Cell columns in `Column::ALL` order, then `extra_columns`.
fn record_columns() -> String {
    let mut names: Vec<&str> = Column::ALL.iter().map(Column::sql_name).collect();
    names.push("extra_columns");
    names.join(", ")
}

fn record_from_row(row: &Row<'_>) -> Result<JobRecord, rusqlite::Error> {
    let mut record = JobRecord::new();
    for (i, column) in Column::ALL.into_iter().enumerate() {
        *record.get_mut(column) = row.get(i)?;
    }
    let extras_idx = Column::ALL.len();
    let extras: String = row.get(extras_idx)?;
    record.extra_columns =
        serde_json::from_str::<BTreeMap<String, CellValue>>(&extras).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(extras_idx, Type::Text, Box::new(e))
        })?;
    Ok(record)
}

/// Load one sheet in row order.
pub fn load_record_set(conn: &Connection, sheet: Sheet) -> Result<Vec<JobRecord>, rusqlite::Error> {
    let sql = format!(
        "SELECT {} FROM job_records WHERE sheet = ?1 ORDER BY position",
        record_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![sheet.as_str()], record_from_row)?;
    rows.collect()
}

fn insert_record(
    conn: &Connection,
    sheet: Sheet,
    position: i64,
    record: &JobRecord,
) -> Result<(), rusqlite::Error> {
    let extras = serde_json::to_string(&record.extra_columns)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let sql = format!(
        "INSERT INTO job_records (sheet, position, {})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        record_columns()
    );
    let [c0, c1, c2, c3, c4, c5, c6, c7, c8, c9] = Column::ALL.map(|c| record.get(c));
    conn.execute(
        &sql,
        params![sheet.as_str(), position, c0, c1, c2, c3, c4, c5, c6, c7, c8, c9, extras],
    )?;
    Ok(())
}

/// Overwrite a sheet with `records`, in order.
pub fn replace_record_set(
    conn: &Connection,
    sheet: Sheet,
    records: &[JobRecord],
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "DELETE FROM job_records WHERE sheet = ?1",
        params![sheet.as_str()],
    )?;
    for (position, record) in records.iter().enumerate() {
        insert_record(conn, sheet, position as i64, record)?;
    }
    Ok(())
}

/// Add `records` after the last row of a sheet.
pub fn append_records(
    conn: &Connection,
    sheet: Sheet,
    records: &[JobRecord],
) -> Result<(), rusqlite::Error> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM job_records WHERE sheet = ?1",
        params![sheet.as_str()],
        |row| row.get(0),
    )?;
    for (offset, record) in records.iter().enumerate() {
        insert_record(conn, sheet, next + offset as i64, record)?;
    }
    Ok(())
}

pub fn count_records(conn: &Connection, sheet: Sheet) -> Result<usize, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM job_records WHERE sheet = ?1",
        params![sheet.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

// ── Metrics tables ─────────────────────────────────────────────────

fn metrics_table(dimension: GroupDimension) -> &'static str {
    match dimension {
        GroupDimension::Area => "area_metrics",
        GroupDimension::Month => "month_metrics",
    }
}

fn insert_metrics_row(
    conn: &Connection,
    table: &str,
    position: usize,
    row: &MetricsRow,
) -> Result<(), rusqlite::Error> {
    let sql = format!(
        "INSERT INTO {table} (
            position, group_key, avg_start_to_complete, avg_call_to_mark,
            avg_mark_to_complete, percent_on_time, jobs_under_10, jobs_10_to_16,
            jobs_over_16, computed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))"
    );
    conn.execute(
        &sql,
        params![
            position as i64,
            row.group,
            row.avg_start_to_complete,
            row.avg_call_to_mark,
            row.avg_mark_to_complete,
            row.percent_on_time,
            row.jobs_under_10 as i64,
            row.jobs_10_to_16 as i64,
            row.jobs_over_16 as i64,
        ],
    )?;
    Ok(())
}

/// Rewrite the area metrics table from scratch.
pub fn replace_area_metrics(conn: &Connection, rows: &[MetricsRow]) -> Result<(), rusqlite::Error> {
    let table = metrics_table(GroupDimension::Area);
    conn.execute(&format!("DELETE FROM {table}"), [])?;
    for (position, row) in rows.iter().enumerate() {
        insert_metrics_row(conn, table, position, row)?;
    }
    Ok(())
}

/// Rewrite the month metrics table, recording each bucket's sort weight.
pub fn replace_month_metrics(
    conn: &Connection,
    rows: &[MetricsRow],
    years: &SupportedYears,
) -> Result<(), rusqlite::Error> {
    let table = metrics_table(GroupDimension::Month);
    conn.execute(&format!("DELETE FROM {table}"), [])?;
    for (position, row) in rows.iter().enumerate() {
        insert_metrics_row(conn, table, position, row)?;
        let weight = MonthKey::parse(&row.group).and_then(|k| k.sort_weight(years));
        conn.execute(
            "UPDATE month_metrics SET sort_weight = ?2 WHERE position = ?1",
            params![position as i64, weight],
        )?;
    }
    Ok(())
}

/// Stored metrics table, in the order it was written.
pub fn load_metrics(
    conn: &Connection,
    dimension: GroupDimension,
) -> Result<Vec<MetricsRow>, rusqlite::Error> {
    let sql = format!(
        "SELECT group_key, avg_start_to_complete, avg_call_to_mark, avg_mark_to_complete,
                percent_on_time, jobs_under_10, jobs_10_to_16, jobs_over_16
         FROM {} ORDER BY position",
        metrics_table(dimension)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(MetricsRow {
            group: row.get(0)?,
            avg_start_to_complete: row.get(1)?,
            avg_call_to_mark: row.get(2)?,
            avg_mark_to_complete: row.get(3)?,
            percent_on_time: row.get(4)?,
            jobs_under_10: row.get::<_, i64>(5)? as u64,
            jobs_10_to_16: row.get::<_, i64>(6)? as u64,
            jobs_over_16: row.get::<_, i64>(7)? as u64,
        })
    })?;
    rows.collect()
}

/// When the stored metrics were last computed, if ever.
pub fn metrics_computed_at(
    conn: &Connection,
    dimension: GroupDimension,
) -> Result<Option<String>, rusqlite::Error> {
    let sql = format!("SELECT MAX(computed_at) FROM {}", metrics_table(dimension));
    conn.query_row(&sql, [], |row| row.get(0))
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Run log ────────────────────────────────────────────────────────

/// Start a run log entry in `running` state and return its id.
pub fn insert_run(conn: &Connection, reference_date: NaiveDate) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO run_log (started_at, reference_date, status)
         VALUES (datetime('now'), ?1, 'running')",
        params![reference_date.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Final state of a run, written back to its log entry.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome<'a> {
    pub status: &'a str,
    pub migration: Option<&'a MigrationReport>,
    pub area_groups: Option<usize>,
    pub month_groups: Option<usize>,
    pub run_time_ms: i64,
    pub backup_path: Option<&'a str>,
    pub error_message: Option<&'a str>,
}

pub fn complete_run(
    conn: &Connection,
    run_id: i64,
    outcome: &RunOutcome<'_>,
) -> Result<(), rusqlite::Error> {
    let m = outcome.migration;
    let count = |n: usize| n as i64;
    conn.execute(
        "UPDATE run_log SET
            status = ?2, completed_at = datetime('now'),
            active_before = ?3, archive_before = ?4, moved = ?5,
            active_after = ?6, archive_after = ?7,
            area_groups = ?8, month_groups = ?9,
            run_time_ms = ?10, backup_path = ?11, error_message = ?12
         WHERE id = ?1",
        params![
            run_id,
            outcome.status,
            m.map(|m| count(m.active_before)),
            m.map(|m| count(m.archive_before)),
            m.map(|m| count(m.moved)),
            m.map(|m| count(m.active_after)),
            m.map(|m| count(m.archive_after)),
            outcome.area_groups.map(count),
            outcome.month_groups.map(count),
            outcome.run_time_ms,
            outcome.backup_path,
            outcome.error_message,
        ],
    )?;
    Ok(())
}

/// One row of the run log.
#[derive(Debug, Clone, Serialize)]
pub struct RunLogEntry {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub reference_date: String,
    pub status: String,
    pub active_before: Option<i64>,
    pub archive_before: Option<i64>,
    pub moved: Option<i64>,
    pub active_after: Option<i64>,
    pub archive_after: Option<i64>,
    pub area_groups: Option<i64>,
    pub month_groups: Option<i64>,
    pub run_time_ms: Option<i64>,
    pub backup_path: Option<String>,
    pub error_message: Option<String>,
}

impl RunLogEntry {
    /// Month the run's reference date falls in, e.g. "Oct 2026".
    pub fn month_key(&self) -> Option<String> {
        NaiveDate::parse_from_str(&self.reference_date, "%Y-%m-%d")
            .ok()
            .map(month_label)
    }
}

/// Most recent runs first.
pub fn list_runs(conn: &Connection, limit: usize) -> Result<Vec<RunLogEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, started_at, completed_at, reference_date, status,
                active_before, archive_before, moved, active_after, archive_after,
                area_groups, month_groups, run_time_ms, backup_path, error_message
         FROM run_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(RunLogEntry {
            id: row.get(0)?,
            started_at: row.get(1)?,
            completed_at: row.get(2)?,
            reference_date: row.get(3)?,
            status: row.get(4)?,
            active_before: row.get(5)?,
            archive_before: row.get(6)?,
            moved: row.get(7)?,
            active_after: row.get(8)?,
            archive_after: row.get(9)?,
            area_groups: row.get(10)?,
            month_groups: row.get(11)?,
            run_time_ms: row.get(12)?,
            backup_path: row.get(13)?,
            error_message: row.get(14)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricValue;
    use crate::storage::Database;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_records() -> Vec<JobRecord> {
        let mut with_extras = JobRecord::new()
            .with(Column::WorkAreaCode, "KX")
            .with(Column::Status, "Completed")
            .with(Column::DropInstallDate, d(2024, 3, 1))
            .with(Column::JobCompletedDate, d(2024, 3, 9))
            .with(Column::Notes, "gate code 12");
        with_extras
            .extra_columns
            .insert("Footage".into(), CellValue::Number(310.0));
        with_extras
            .extra_columns
            .insert("Crew".into(), CellValue::Text("North".into()));
        vec![
            with_extras,
            JobRecord::new()
                .with(Column::Address, "12 Elm")
                .with(Column::Mark811Date, "see notes"),
            JobRecord::new(),
        ]
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "archive_after_days", "90")?;
                let val = get_config(conn, "archive_after_days")?;
                assert_eq!(val, Some("90".to_string()));

                set_config(conn, "archive_after_days", "60")?;
                assert_eq!(get_config(conn, "archive_after_days")?, Some("60".into()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);

                set_config(conn, "backup_dir", "/tmp/b")?;
                let all = list_config(conn)?;
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].0, "archive_after_days");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_set_round_trip() {
        let db = Database::open_memory().await.unwrap();
        let records = sample_records();
        let expected = records.clone();

        let loaded = db
            .writer()
            .call(move |conn| {
                replace_record_set(conn, Sheet::Active, &records)?;
                load_record_set(conn, Sheet::Active)
            })
            .await
            .unwrap();

        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn test_replace_and_append_keep_sheets_apart() {
        let db = Database::open_memory().await.unwrap();
        let records = sample_records();

        db.writer()
            .call(move |conn| {
                replace_record_set(conn, Sheet::Active, &records)?;
                replace_record_set(conn, Sheet::Archive, &records[..1])?;
                append_records(conn, Sheet::Archive, &records[1..])?;
                assert_eq!(count_records(conn, Sheet::Active)?, 3);
                assert_eq!(count_records(conn, Sheet::Archive)?, 3);
                assert_eq!(
                    load_record_set(conn, Sheet::Archive)?,
                    load_record_set(conn, Sheet::Active)?
                );

                replace_record_set(conn, Sheet::Active, &[])?;
                assert_eq!(count_records(conn, Sheet::Active)?, 0);
                assert_eq!(count_records(conn, Sheet::Archive)?, 3);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    fn metrics_row(group: &str, avg: MetricValue) -> MetricsRow {
        MetricsRow {
            group: group.into(),
            avg_start_to_complete: avg,
            avg_call_to_mark: MetricValue::NotAvailable,
            avg_mark_to_complete: MetricValue::Value(2.5),
            percent_on_time: MetricValue::Value(66.67),
            jobs_under_10: 1,
            jobs_10_to_16: 1,
            jobs_over_16: 1,
        }
    }

    #[tokio::test]
    async fn test_metrics_tables_round_trip() {
        let db = Database::open_memory().await.unwrap();
        let area = vec![
            metrics_row("ZZ", MetricValue::Value(12.33)),
            metrics_row("AB", MetricValue::NotAvailable),
        ];
        let month = vec![metrics_row("12-2023", MetricValue::Value(4.0))];
        let (area_in, month_in) = (area.clone(), month.clone());

        let (area_out, month_out, weight) = db
            .writer()
            .call(move |conn| {
                replace_area_metrics(conn, &area_in)?;
                replace_month_metrics(conn, &month_in, &SupportedYears::default())?;
                // A second write replaces rather than accumulates
                replace_area_metrics(conn, &area_in)?;
                let weight: Option<i64> = conn.query_row(
                    "SELECT sort_weight FROM month_metrics WHERE group_key = '12-2023'",
                    [],
                    |row| row.get(0),
                )?;
                Ok::<_, rusqlite::Error>((
                    load_metrics(conn, GroupDimension::Area)?,
                    load_metrics(conn, GroupDimension::Month)?,
                    weight,
                ))
            })
            .await
            .unwrap();

        assert_eq!(area_out, area);
        assert_eq!(month_out, month);
        assert_eq!(weight, Some(112));
    }

    #[tokio::test]
    async fn test_run_log_round_trip() {
        let db = Database::open_memory().await.unwrap();

        let runs = db
            .writer()
            .call(|conn| {
                let first = insert_run(conn, d(2026, 10, 18))?;
                complete_run(
                    conn,
                    first,
                    &RunOutcome {
                        status: "failed",
                        error_message: Some("disk full"),
                        ..Default::default()
                    },
                )?;

                let second = insert_run(conn, d(2026, 10, 19))?;
                let report = MigrationReport {
                    reference_date: d(2026, 10, 19),
                    active_before: 5,
                    archive_before: 2,
                    moved: 1,
                    active_after: 4,
                    archive_after: 3,
                };
                complete_run(
                    conn,
                    second,
                    &RunOutcome {
                        status: "completed",
                        migration: Some(&report),
                        area_groups: Some(2),
                        month_groups: Some(3),
                        run_time_ms: 42,
                        backup_path: Some("/b/Oct 2026/Backup - 10-19-2026.db"),
                        error_message: None,
                    },
                )?;
                list_runs(conn, 10)
            })
            .await
            .unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].moved, Some(1));
        assert_eq!(runs[0].archive_after, Some(3));
        assert_eq!(runs[0].month_groups, Some(3));
        assert_eq!(runs[0].month_key().as_deref(), Some("Oct 2026"));
        assert!(runs[0].completed_at.is_some());
        assert_eq!(runs[1].status, "failed");
        assert_eq!(runs[1].error_message.as_deref(), Some("disk full"));
        assert_eq!(runs[1].moved, None);
    }
}
