use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::date_util::month_label;
use crate::error::{Error, Result};
use crate::storage::Database;

/// Where the snapshot for `date` goes: `<root>/<Mon YYYY>/Backup - MM-DD-YYYY.db`.
pub fn backup_path(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(month_label(date))
        .join(format!("Backup - {}.db", date.format("%m-%d-%Y")))
}

fn sql_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Snapshot the whole store before a run mutates it.
///
/// The month directory is created on demand. A snapshot already taken for
/// the same day is replaced, so a rerun keeps the latest pre-run state.
pub async fn write_backup(db: &Database, root: &Path, date: NaiveDate) -> Result<PathBuf> {
    let path = backup_path(root, date);
    if let Some(month_dir) = path.parent() {
        std::fs::create_dir_all(month_dir)
            .map_err(|e| Error::Backup(format!("{}: {e}", month_dir.display())))?;
    }
    if path.exists() {
        log::warn!("Replacing existing backup {}", path.display());
        std::fs::remove_file(&path)
            .map_err(|e| Error::Backup(format!("{}: {e}", path.display())))?;
    }

    let target = path
        .to_str()
        .ok_or_else(|| Error::Backup(format!("non UTF-8 backup path {}", path.display())))?;
    let sql = format!("VACUUM INTO {}", sql_string_literal(target));
    db.writer()
        .call(move |conn| {
            conn.execute_batch(&sql)?;
            Ok::<(), rusqlite::Error>(())
        })
        .await
        .map_err(|e| Error::Backup(e.to_string()))?;

    log::info!("Backed up tracker to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, JobRecord, Sheet};
    use crate::storage::repository;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_backup_path_layout() {
        let path = backup_path(Path::new("/backups"), d(2026, 10, 9));
        assert_eq!(
            path,
            PathBuf::from("/backups/Oct 2026/Backup - 10-09-2026.db")
        );
    }

    #[test]
    fn test_sql_string_literal_escapes_quotes() {
        assert_eq!(sql_string_literal("/tmp/o'neil"), "'/tmp/o''neil'");
    }

    #[tokio::test]
    async fn test_write_backup_snapshots_records() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                let records = vec![JobRecord::new().with(Column::Address, "1 Oak")];
                repository::replace_record_set(conn, Sheet::Active, &records)
            })
            .await
            .unwrap();

        let path = write_backup(&db, dir.path(), d(2026, 10, 19)).await.unwrap();
        assert!(path.ends_with("Oct 2026/Backup - 10-19-2026.db"));
        assert!(path.exists());

        let snapshot = Database::open_at(&path).await.unwrap();
        let count = snapshot
            .reader()
            .call(|conn| repository::count_records(conn, Sheet::Active))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_same_day_backup_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_memory().await.unwrap();
        let first = write_backup(&db, dir.path(), d(2026, 10, 19)).await.unwrap();
        let second = write_backup(&db, dir.path(), d(2026, 10, 19)).await.unwrap();
        assert_eq!(first, second);
        assert!(second.exists());
    }
}
