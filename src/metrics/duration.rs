use std::fmt;

use serde::Serialize;

use crate::date_util::days_between;
use crate::record::{CellValue, JobRecord};

/// Longest span, in days, still treated as a real job. Anything longer is a
/// typo or an abandoned job and is dropped from the statistics.
pub const MAX_SAMPLE_DAYS: i64 = 100;

/// The three milestone spans the tracker reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DurationKind {
    /// Drop installation to job completion; completed jobs only.
    StartToComplete,
    /// 811 locate called in to 811 marked.
    CallToMark,
    /// 811 marked to job completion.
    MarkToComplete,
}

impl DurationKind {
    pub const ALL: [DurationKind; 3] = [
        DurationKind::StartToComplete,
        DurationKind::CallToMark,
        DurationKind::MarkToComplete,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DurationKind::StartToComplete => "Average Completion Time (Start to Finish)",
            DurationKind::CallToMark => "Average 811 Call to 811 Mark Time",
            DurationKind::MarkToComplete => "Average 811 Mark to Completion Time",
        }
    }
}

impl fmt::Display for DurationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DurationKind::StartToComplete => "start-to-complete",
            DurationKind::CallToMark => "call-to-mark",
            DurationKind::MarkToComplete => "mark-to-complete",
        };
        f.write_str(s)
    }
}

/// Days between two milestones of one record, or `None` when either cell is
/// not a date or the span falls outside `0..=MAX_SAMPLE_DAYS`.
pub fn extract(record: &JobRecord, kind: DurationKind) -> Option<u32> {
    let (from, to) = match kind {
        DurationKind::StartToComplete => {
            if !record.is_completed() {
                return None;
            }
            (&record.drop_install_date, &record.job_completed_date)
        }
        DurationKind::CallToMark => (&record.call811_date, &record.mark811_date),
        DurationKind::MarkToComplete => (&record.mark811_date, &record.job_completed_date),
    };
    span_days(from, to)
}

fn span_days(from: &CellValue, to: &CellValue) -> Option<u32> {
    let days = days_between(from.as_date()?, to.as_date()?);
    if (0..=MAX_SAMPLE_DAYS).contains(&days) {
        u32::try_from(days).ok()
    } else {
        None
    }
}

/// Every sample one record can contribute, computed in a single visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSamples {
    pub start_to_complete: Option<u32>,
    pub call_to_mark: Option<u32>,
    pub mark_to_complete: Option<u32>,
}

impl RecordSamples {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            start_to_complete: extract(record, DurationKind::StartToComplete),
            call_to_mark: extract(record, DurationKind::CallToMark),
            mark_to_complete: extract(record, DurationKind::MarkToComplete),
        }
    }

    pub fn get(&self, kind: DurationKind) -> Option<u32> {
        match kind {
            DurationKind::StartToComplete => self.start_to_complete,
            DurationKind::CallToMark => self.call_to_mark,
            DurationKind::MarkToComplete => self.mark_to_complete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_to_complete.is_none()
            && self.call_to_mark.is_none()
            && self.mark_to_complete.is_none()
    }
}
