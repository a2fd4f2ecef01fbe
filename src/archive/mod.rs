use chrono::NaiveDate;
use serde::Serialize;

use crate::date_util::days_between;
use crate::record::JobRecord;

/// Days after completion at which a job leaves the active sheet.
pub const DEFAULT_ARCHIVE_AFTER_DAYS: i64 = 90;

/// Decides which completed jobs are old enough to archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchivePolicy {
    pub after_days: i64,
}

impl Default for ArchivePolicy {
    fn default() -> Self {
        Self {
            after_days: DEFAULT_ARCHIVE_AFTER_DAYS,
        }
    }
}

impl ArchivePolicy {
    pub fn new(after_days: i64) -> Self {
        Self { after_days }
    }

    /// A job is archived when its status is "completed" (any case), it has a
    /// completion date, and that date is at least `after_days` before
    /// `reference_date`. Nothing else about the record matters.
    pub fn should_archive(&self, record: &JobRecord, reference_date: NaiveDate) -> bool {
        if !record.is_completed() {
            return false;
        }
        match record.job_completed_date.as_date() {
            Some(completed) => days_between(completed, reference_date) >= self.after_days,
            None => false,
        }
    }

    /// Split `active` into (keep, move), preserving relative order in both.
    pub fn partition(
        &self,
        active: Vec<JobRecord>,
        reference_date: NaiveDate,
    ) -> (Vec<JobRecord>, Vec<JobRecord>) {
        active
            .into_iter()
            .partition(|record| !self.should_archive(record, reference_date))
    }

    /// Move archivable jobs from `active` to the end of `archive`.
    ///
    /// Records are moved as-is. Nothing ever flows back from the archive.
    pub fn migrate(
        &self,
        active: Vec<JobRecord>,
        mut archive: Vec<JobRecord>,
        reference_date: NaiveDate,
    ) -> Migration {
        let report_before = (active.len(), archive.len());
        log::info!(
            "Rows before migration: {} active, {} archived",
            report_before.0,
            report_before.1
        );

        let (keep, to_move) = self.partition(active, reference_date);
        log::info!(
            "Keeping {} rows, archiving {} rows (completed >= {} days before {reference_date})",
            keep.len(),
            to_move.len(),
            self.after_days
        );

        let moved = to_move.len();
        archive.extend(to_move);

        let report = MigrationReport {
            reference_date,
            active_before: report_before.0,
            archive_before: report_before.1,
            moved,
            active_after: keep.len(),
            archive_after: archive.len(),
        };
        log::info!(
            "Rows after migration: {} active, {} archived",
            report.active_after,
            report.archive_after
        );

        Migration {
            active: keep,
            archive,
            report,
        }
    }
}

/// Classify one record against the default 90-day policy.
pub fn should_archive(record: &JobRecord, reference_date: NaiveDate) -> bool {
    ArchivePolicy::default().should_archive(record, reference_date)
}

/// Migrate with the default 90-day policy.
pub fn migrate(
    active: Vec<JobRecord>,
    archive: Vec<JobRecord>,
    reference_date: NaiveDate,
) -> Migration {
    ArchivePolicy::default().migrate(active, archive, reference_date)
}

/// Record sets after a migration pass.
#[derive(Debug, Clone)]
pub struct Migration {
    pub active: Vec<JobRecord>,
    pub archive: Vec<JobRecord>,
    pub report: MigrationReport,
}

/// Row counts around a migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub reference_date: NaiveDate,
    pub active_before: usize,
    pub archive_before: usize,
    pub moved: usize,
    pub active_after: usize,
    pub archive_after: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CellValue, Column};
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn done(status: &str, completed: NaiveDate) -> JobRecord {
        JobRecord::new()
            .with(Column::Status, status)
            .with(Column::JobCompletedDate, completed)
    }

    #[test]
    fn test_completed_95_days_ago_is_archived() {
        let reference = d(2024, 6, 1);
        let r = done("COMPLETED", reference - Duration::days(95));
        assert!(should_archive(&r, reference));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let reference = d(2024, 6, 1);
        assert!(should_archive(&done("completed", reference - Duration::days(90)), reference));
        assert!(!should_archive(&done("completed", reference - Duration::days(89)), reference));
    }

    #[test]
    fn test_completion_time_of_day_is_ignored() {
        let reference = d(2024, 6, 1);
        let completed = (reference - Duration::days(90)).and_hms_opt(23, 59, 0).unwrap();
        let r = JobRecord::new()
            .with(Column::Status, "Completed")
            .with(Column::JobCompletedDate, completed);
        assert!(should_archive(&r, reference));
    }

    #[test]
    fn test_never_archived_without_status_or_date() {
        let reference = d(2024, 6, 1);
        let old = reference - Duration::days(400);
        assert!(!should_archive(&done("CANCELLED", old), reference));
        assert!(!should_archive(&done("", old), reference));
        assert!(!should_archive(&done("completed ", old), reference));

        let no_date = JobRecord::new().with(Column::Status, "COMPLETED");
        assert!(!should_archive(&no_date, reference));
        let text_date = no_date.clone().with(Column::JobCompletedDate, "done last spring");
        assert!(!should_archive(&text_date, reference));
    }

    #[test]
    fn test_future_completion_not_archived() {
        let reference = d(2024, 6, 1);
        assert!(!should_archive(&done("completed", d(2024, 9, 1)), reference));
    }

    #[test]
    fn test_classification_is_stable() {
        let reference = d(2024, 6, 1);
        let r = done("Completed", d(2024, 2, 1)).with(Column::Notes, "gate code 1234");
        let first = should_archive(&r, reference);
        for _ in 0..5 {
            assert_eq!(should_archive(&r, reference), first);
        }
        // Unrelated columns do not change the decision
        let other = r.clone().with(Column::WorkAreaCode, "ZZ").with(Column::Address, "1 Main");
        assert_eq!(should_archive(&other, reference), first);
    }

    #[test]
    fn test_custom_policy() {
        let reference = d(2024, 6, 1);
        let r = done("completed", reference - Duration::days(31));
        assert!(ArchivePolicy::new(30).should_archive(&r, reference));
        assert!(!ArchivePolicy::default().should_archive(&r, reference));
    }

    #[test]
    fn test_migrate_moves_old_jobs_to_archive_tail() {
        let reference = d(2024, 6, 1);
        let active = vec![
            done("completed", d(2024, 1, 1)).with(Column::Address, "1 Oak"),
            done("SCHEDULED", d(2024, 1, 1)).with(Column::Address, "2 Oak"),
            done("Completed", d(2024, 5, 30)).with(Column::Address, "3 Oak"),
            done("COMPLETED", d(2023, 12, 1)).with(Column::Address, "4 Oak"),
        ];
        let archive = vec![done("completed", d(2023, 1, 1)).with(Column::Address, "0 Elm")];

        let m = migrate(active, archive, reference);

        let addr = |set: &[JobRecord]| -> Vec<String> {
            set.iter().map(|r| r.address.to_string()).collect()
        };
        assert_eq!(addr(&m.active), vec!["2 Oak", "3 Oak"]);
        assert_eq!(addr(&m.archive), vec!["0 Elm", "1 Oak", "4 Oak"]);
        assert_eq!(m.report.moved, 2);
        assert_eq!(m.report.active_before, 4);
        assert_eq!(m.report.archive_before, 1);
        assert_eq!(m.report.active_after, 2);
        assert_eq!(m.report.archive_after, 3);
    }

    #[test]
    fn test_migrate_preserves_fields_including_extras() {
        let reference = d(2024, 6, 1);
        let mut record = done("completed", d(2024, 1, 1)).with(Column::Mark811Date, "?");
        record
            .extra_columns
            .insert("Footage".into(), CellValue::Number(250.0));
        let m = migrate(vec![record.clone()], Vec::new(), reference);
        assert_eq!(m.archive, vec![record]);
        assert!(m.active.is_empty());
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let reference = d(2024, 6, 1);
        let statuses = ["completed", "COMPLETED", "scheduled", "", "Completed"];
        let mut active = Vec::new();
        for (i, offset) in (0..200i64).step_by(7).enumerate() {
            let status = statuses[i % statuses.len()];
            active.push(
                done(status, reference - Duration::days(offset))
                    .with(Column::Address, format!("{i} Pine").as_str()),
            );
        }
        let total = active.len();
        let (keep, to_move) = ArchivePolicy::default().partition(active, reference);
        assert_eq!(keep.len() + to_move.len(), total);
        for r in &to_move {
            assert!(should_archive(r, reference));
            assert!(!keep.contains(r));
        }
        for r in &keep {
            assert!(!should_archive(r, reference));
        }
    }

    #[test]
    fn test_migrate_empty_sets() {
        let m = migrate(Vec::new(), Vec::new(), d(2024, 6, 1));
        assert!(m.active.is_empty());
        assert!(m.archive.is_empty());
        assert_eq!(m.report.moved, 0);
    }
}
