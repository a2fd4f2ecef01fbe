pub mod duration;
pub mod grouping;
pub mod types;

pub use duration::{extract, DurationKind, RecordSamples, MAX_SAMPLE_DAYS};
pub use grouping::{
    group_universe, AreaCode, AreaResolver, GroupResolver, MonthKey, MonthResolver,
    SupportedYears,
};
pub use types::*;

use std::collections::HashMap;

use crate::record::JobRecord;

/// Raw samples collected for one group, per duration kind.
#[derive(Debug, Clone, Default)]
struct GroupSamples {
    start_to_complete: Vec<u32>,
    call_to_mark: Vec<u32>,
    mark_to_complete: Vec<u32>,
}

impl GroupSamples {
    fn push(&mut self, samples: RecordSamples) {
        self.start_to_complete.extend(samples.start_to_complete);
        self.call_to_mark.extend(samples.call_to_mark);
        self.mark_to_complete.extend(samples.mark_to_complete);
    }

    fn into_row(self, group: String) -> MetricsRow {
        let buckets = BucketCounts::from_samples(&self.start_to_complete);
        MetricsRow {
            group,
            avg_start_to_complete: mean_of(&self.start_to_complete),
            avg_call_to_mark: mean_of(&self.call_to_mark),
            avg_mark_to_complete: mean_of(&self.mark_to_complete),
            percent_on_time: buckets.percent_on_time(),
            jobs_under_10: buckets.under_10,
            jobs_10_to_16: buckets.from_10_to_16,
            jobs_over_16: buckets.over_16,
        }
    }
}

/// Compute one metrics row per group, in the order of `groups`.
///
/// Each record of both sets is visited once: its key is resolved and all
/// three samples are extracted together, then fanned out to the group.
/// Records whose key is unresolvable, or resolves outside `groups`,
/// contribute nothing. Groups without samples still get a row.
pub fn aggregate<R: GroupResolver>(
    resolver: &R,
    groups: &[R::Key],
    active: &[JobRecord],
    archive: &[JobRecord],
) -> Vec<MetricsRow> {
    let mut by_group: HashMap<R::Key, GroupSamples> = groups
        .iter()
        .map(|key| (key.clone(), GroupSamples::default()))
        .collect();

    for record in active.iter().chain(archive) {
        let Some(key) = resolver.resolve(record) else {
            continue;
        };
        let Some(bucket) = by_group.get_mut(&key) else {
            continue;
        };
        let samples = RecordSamples::from_record(record);
        if !samples.is_empty() {
            bucket.push(samples);
        }
    }

    groups
        .iter()
        .map(|key| {
            by_group
                .remove(key)
                .unwrap_or_default()
                .into_row(key.to_string())
        })
        .collect()
}

/// Resolve the group universe from both sets and aggregate over it.
pub fn compute_table<R: GroupResolver>(
    resolver: &R,
    active: &[JobRecord],
    archive: &[JobRecord],
) -> Vec<MetricsRow> {
    let groups = group_universe(resolver, &[active, archive]);
    log::debug!("Aggregating {} groups", groups.len());
    aggregate(resolver, &groups, active, archive)
}

/// Per-work-area metrics table.
pub fn area_metrics(active: &[JobRecord], archive: &[JobRecord]) -> Vec<MetricsRow> {
    compute_table(&AreaResolver, active, archive)
}

/// Per-month metrics table, chronologically ordered.
pub fn month_metrics(
    active: &[JobRecord],
    archive: &[JobRecord],
    years: SupportedYears,
) -> Vec<MetricsRow> {
    compute_table(&MonthResolver::new(years), active, archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Column;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn job(area: &str, start: NaiveDate, days: i64) -> JobRecord {
        JobRecord::new()
            .with(Column::WorkAreaCode, area)
            .with(Column::Status, "Completed")
            .with(Column::DropInstallDate, start)
            .with(Column::JobCompletedDate, start + chrono::Duration::days(days))
    }

    #[test]
    fn test_area_metrics_combines_active_and_archive() {
        let active = vec![job("KX", d(2024, 1, 1), 5), job(" kx", d(2024, 1, 3), 12)];
        let archive = vec![job("KX", d(2023, 12, 1), 20)];
        let rows = area_metrics(&active, &archive);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.group, "KX");
        assert_eq!(row.avg_start_to_complete, MetricValue::Value(12.33));
        assert_eq!(row.jobs_under_10, 1);
        assert_eq!(row.jobs_10_to_16, 1);
        assert_eq!(row.jobs_over_16, 1);
        assert_eq!(row.percent_on_time, MetricValue::Value(66.67));
        assert_eq!(row.avg_call_to_mark, MetricValue::NotAvailable);
        assert_eq!(row.avg_mark_to_complete, MetricValue::NotAvailable);
    }

    #[test]
    fn test_ten_day_job_lands_in_middle_bucket() {
        let active = vec![job("AB", d(2024, 1, 1), 10)];
        let rows = area_metrics(&active, &[]);
        assert_eq!(rows[0].avg_start_to_complete, MetricValue::Value(10.0));
        assert_eq!(rows[0].jobs_under_10, 0);
        assert_eq!(rows[0].jobs_10_to_16, 1);
        assert_eq!(rows[0].percent_on_time, MetricValue::Value(100.0));
    }

    #[test]
    fn test_group_without_samples_reports_not_available() {
        // Known area but nothing measurable
        let active = vec![JobRecord::new()
            .with(Column::WorkAreaCode, "ZZ")
            .with(Column::Status, "SCHEDULED")];
        let rows = area_metrics(&active, &[]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.avg_start_to_complete, MetricValue::NotAvailable);
        assert_eq!(row.avg_call_to_mark, MetricValue::NotAvailable);
        assert_eq!(row.avg_mark_to_complete, MetricValue::NotAvailable);
        assert_eq!(row.percent_on_time, MetricValue::NotAvailable);
        assert_eq!(row.buckets(), BucketCounts::default());
    }

    #[test]
    fn test_explicit_empty_group_list_entry() {
        let groups = vec![AreaCode::parse("QQ").unwrap()];
        let rows = aggregate(&AreaResolver, &groups, &[], &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, "QQ");
        assert_eq!(rows[0].percent_on_time, MetricValue::NotAvailable);
        assert_eq!(rows[0].jobs_under_10 + rows[0].jobs_10_to_16 + rows[0].jobs_over_16, 0);
    }

    #[test]
    fn test_unresolvable_records_are_never_attributed() {
        let active = vec![
            job("AB", d(2024, 1, 1), 5),
            job("ABC", d(2024, 1, 1), 50),
            job("", d(2024, 1, 1), 50),
        ];
        let rows = area_metrics(&active, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg_start_to_complete, MetricValue::Value(5.0));
        assert_eq!(rows[0].buckets().total(), 1);
    }

    #[test]
    fn test_call_and_mark_samples_ignore_status() {
        let record = JobRecord::new()
            .with(Column::WorkAreaCode, "CD")
            .with(Column::Status, "WAITING ON 811")
            .with(Column::Call811Date, d(2024, 4, 1))
            .with(Column::Mark811Date, d(2024, 4, 4))
            .with(Column::JobCompletedDate, d(2024, 4, 10));
        let rows = area_metrics(&[record], &[]);
        assert_eq!(rows[0].avg_call_to_mark, MetricValue::Value(3.0));
        assert_eq!(rows[0].avg_mark_to_complete, MetricValue::Value(6.0));
        assert_eq!(rows[0].avg_start_to_complete, MetricValue::NotAvailable);
        assert_eq!(rows[0].percent_on_time, MetricValue::NotAvailable);
    }

    #[test]
    fn test_month_metrics_same_month_aggregated_together() {
        let active = vec![job("AB", d(2024, 3, 2), 4), job("CD", d(2024, 3, 27), 8)];
        let archive = vec![job("AB", d(2023, 12, 10), 30)];
        let rows = month_metrics(&active, &archive, SupportedYears::default());
        let groups: Vec<&str> = rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["12-2023", "03-2024"]);
        assert_eq!(rows[1].avg_start_to_complete, MetricValue::Value(6.0));
        assert_eq!(rows[1].jobs_under_10, 2);
        assert_eq!(rows[0].jobs_over_16, 1);
        assert_eq!(rows[0].percent_on_time, MetricValue::Value(0.0));
    }

    #[test]
    fn test_month_metrics_skip_unsupported_years() {
        let active = vec![job("AB", d(2019, 3, 2), 4), job("AB", d(2024, 5, 1), 4)];
        let rows = month_metrics(&active, &[], SupportedYears::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, "05-2024");
    }

    #[test]
    fn test_out_of_range_samples_excluded_from_stats() {
        let active = vec![job("AB", d(2024, 1, 1), 8), job("AB", d(2024, 1, 1), 250)];
        let rows = area_metrics(&active, &[]);
        assert_eq!(rows[0].avg_start_to_complete, MetricValue::Value(8.0));
        assert_eq!(rows[0].buckets().total(), 1);
    }

    #[test]
    fn test_bucket_totals_match_sample_counts() {
        let mut active = Vec::new();
        for days in 0..=40 {
            active.push(job("AB", d(2024, 2, 1), days));
        }
        let rows = area_metrics(&active, &[]);
        assert_eq!(rows[0].buckets().total(), 41);
        assert_eq!(rows[0].jobs_under_10, 10);
        assert_eq!(rows[0].jobs_10_to_16, 7);
        assert_eq!(rows[0].jobs_over_16, 24);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(area_metrics(&[], &[]).is_empty());
        assert!(month_metrics(&[], &[], SupportedYears::default()).is_empty());
    }
}
