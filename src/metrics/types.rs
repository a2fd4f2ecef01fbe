use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use serde::{Serialize, Serializer};

use super::duration::DurationKind;

/// Literal shown in place of a statistic that has no samples behind it.
pub const NOT_AVAILABLE: &str = "N/A";

/// Largest start-to-complete span in the fast bucket is `FAST_BELOW - 1`.
pub const FAST_BELOW: u32 = 10;
/// Largest start-to-complete span still counted as on time.
pub const ON_TIME_MAX: u32 = 16;

/// A reported statistic, or the explicit `"N/A"` sentinel.
///
/// Kept distinct from zero all the way to storage and rendering so an empty
/// group never reads as a perfect (or terrible) one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    NotAvailable,
}

impl MetricValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(*v),
            MetricValue::NotAvailable => None,
        }
    }
}

/// Round to two decimal places, exact halves to the even digit.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round_ties_even() / 100.0
}

/// Mean of the samples rounded to two places, or `N/A` for none.
pub fn mean_of(samples: &[u32]) -> MetricValue {
    if samples.is_empty() {
        return MetricValue::NotAvailable;
    }
    let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
    MetricValue::Value(round2(sum as f64 / samples.len() as f64))
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{v:.2}"),
            MetricValue::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Value(v) => serializer.serialize_f64(*v),
            MetricValue::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl ToSql for MetricValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            MetricValue::Value(v) => ToSqlOutput::Owned(Value::Real(*v)),
            MetricValue::NotAvailable => {
                ToSqlOutput::Borrowed(ValueRef::Text(NOT_AVAILABLE.as_bytes()))
            }
        })
    }
}

impl FromSql for MetricValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Real(v) => Ok(MetricValue::Value(v)),
            ValueRef::Integer(i) => Ok(MetricValue::Value(i as f64)),
            ValueRef::Text(t) if t == NOT_AVAILABLE.as_bytes() => Ok(MetricValue::NotAvailable),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Start-to-complete histogram: `< 10`, `10..=16`, `> 16` days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub under_10: u64,
    pub from_10_to_16: u64,
    pub over_16: u64,
}

impl BucketCounts {
    pub fn from_samples(samples: &[u32]) -> Self {
        let mut counts = Self::default();
        for &days in samples {
            if days < FAST_BELOW {
                counts.under_10 += 1;
            } else if days <= ON_TIME_MAX {
                counts.from_10_to_16 += 1;
            } else {
                counts.over_16 += 1;
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.under_10 + self.from_10_to_16 + self.over_16
    }

    pub fn on_time(&self) -> u64 {
        self.under_10 + self.from_10_to_16
    }

    /// Share of jobs finished within `ON_TIME_MAX` days, as a rounded percentage.
    pub fn percent_on_time(&self) -> MetricValue {
        match self.total() {
            0 => MetricValue::NotAvailable,
            total => MetricValue::Value(round2(self.on_time() as f64 / total as f64 * 100.0)),
        }
    }
}

/// Which reporting table a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupDimension {
    Area,
    Month,
}

impl GroupDimension {
    /// Header of the key column in the workbook.
    pub fn key_header(&self) -> &'static str {
        match self {
            GroupDimension::Area => "Area ID",
            GroupDimension::Month => "Month",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            GroupDimension::Area => "Area Metrics",
            GroupDimension::Month => "Month-by-Month Metrics",
        }
    }
}

/// One row of the area or month metrics table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRow {
    pub group: String,
    pub avg_start_to_complete: MetricValue,
    pub avg_call_to_mark: MetricValue,
    pub avg_mark_to_complete: MetricValue,
    pub percent_on_time: MetricValue,
    pub jobs_under_10: u64,
    pub jobs_10_to_16: u64,
    pub jobs_over_16: u64,
}

impl MetricsRow {
    pub fn buckets(&self) -> BucketCounts {
        BucketCounts {
            under_10: self.jobs_under_10,
            from_10_to_16: self.jobs_10_to_16,
            over_16: self.jobs_over_16,
        }
    }
}

/// Column headers of a metrics table, in output order.
pub fn metrics_headers(dimension: GroupDimension) -> [&'static str; 8] {
    [
        dimension.key_header(),
        DurationKind::StartToComplete.label(),
        DurationKind::CallToMark.label(),
        DurationKind::MarkToComplete.label(),
        "% of Jobs Completed on Time (<= 16 Days)",
        "# of Jobs (< 10 Days)",
        "# of Jobs ( 10 <= x <= 16 Days)",
        "# of Jobs (> 16 Days)",
    ]
}
