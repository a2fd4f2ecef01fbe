//! Threshold ratings and plain-text rendering of the metrics tables.
//!
//! The rating boundaries mirror the aggregation buckets: a start-to-complete
//! average of 16 days or less is never rated worse than `Fair`, matching the
//! on-time definition used for the percentage column.

use std::fmt::Write as _;

use serde::Serialize;

use crate::metrics::{metrics_headers, DurationKind, GroupDimension, MetricValue, MetricsRow};

/// Colour band a statistic falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Good,
    Fair,
    Poor,
    Bad,
    NotAvailable,
}

impl Rating {
    /// Single-character marker used in text output.
    pub fn marker(&self) -> char {
        match self {
            Rating::Good => '+',
            Rating::Fair => '~',
            Rating::Poor => '-',
            Rating::Bad => '!',
            Rating::NotAvailable => ' ',
        }
    }

    /// Fill colour (RGB hex) of the band in the tracker workbook.
    pub fn fill_color(&self) -> &'static str {
        match self {
            Rating::Good => "00FF00",
            Rating::Fair => "90EE90",
            Rating::Poor => "F08080",
            Rating::Bad => "FF0000",
            Rating::NotAvailable => "808080",
        }
    }
}

/// Upper bounds for the good and fair bands; poor runs up to 20 days.
fn duration_bounds(kind: DurationKind) -> (f64, f64) {
    match kind {
        DurationKind::StartToComplete => (10.0, 16.0),
        DurationKind::CallToMark | DurationKind::MarkToComplete => (7.0, 14.0),
    }
}

const POOR_DURATION_MAX: f64 = 20.0;

/// Rate an average duration: below `good`, up to `fair` inclusive, up to 20, above.
pub fn rate_duration(kind: DurationKind, value: MetricValue) -> Rating {
    let Some(days) = value.value() else {
        return Rating::NotAvailable;
    };
    let (good, fair) = duration_bounds(kind);
    if days < good {
        Rating::Good
    } else if days <= fair {
        Rating::Fair
    } else if days <= POOR_DURATION_MAX {
        Rating::Poor
    } else {
        Rating::Bad
    }
}

/// Rate an on-time percentage: `>= 95`, `90..95`, `80..90`, `< 80`.
pub fn rate_on_time(value: MetricValue) -> Rating {
    match value.value() {
        None => Rating::NotAvailable,
        Some(p) if p >= 95.0 => Rating::Good,
        Some(p) if p >= 90.0 => Rating::Fair,
        Some(p) if p >= 80.0 => Rating::Poor,
        Some(_) => Rating::Bad,
    }
}

/// Ratings for the four coloured columns of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowRatings {
    pub start_to_complete: Rating,
    pub call_to_mark: Rating,
    pub mark_to_complete: Rating,
    pub on_time: Rating,
}

impl RowRatings {
    pub fn of(row: &MetricsRow) -> Self {
        Self {
            start_to_complete: rate_duration(
                DurationKind::StartToComplete,
                row.avg_start_to_complete,
            ),
            call_to_mark: rate_duration(DurationKind::CallToMark, row.avg_call_to_mark),
            mark_to_complete: rate_duration(DurationKind::MarkToComplete, row.avg_mark_to_complete),
            on_time: rate_on_time(row.percent_on_time),
        }
    }

    /// Workbook fill colours of the four rated cells.
    pub fn fill_colors(&self) -> RowFills {
        RowFills {
            start_to_complete: self.start_to_complete.fill_color(),
            call_to_mark: self.call_to_mark.fill_color(),
            mark_to_complete: self.mark_to_complete.fill_color(),
            on_time: self.on_time.fill_color(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowFills {
    pub start_to_complete: &'static str,
    pub call_to_mark: &'static str,
    pub mark_to_complete: &'static str,
    pub on_time: &'static str,
}

/// A metrics row with its ratings, for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct RatedRow<'a> {
    #[serde(flatten)]
    pub row: &'a MetricsRow,
    pub ratings: RowRatings,
    pub fills: RowFills,
}

pub fn rate_rows(rows: &[MetricsRow]) -> Vec<RatedRow<'_>> {
    rows.iter()
        .map(|row| {
            let ratings = RowRatings::of(row);
            RatedRow {
                row,
                ratings,
                fills: ratings.fill_colors(),
            }
        })
        .collect()
}

/// A whole metrics table as the workbook shows it: title, headers, rated rows.
#[derive(Debug, Clone, Serialize)]
pub struct RatedTable<'a> {
    pub title: &'static str,
    pub headers: [&'static str; 8],
    pub rows: Vec<RatedRow<'a>>,
}

pub fn rate_table(dimension: GroupDimension, rows: &[MetricsRow]) -> RatedTable<'_> {
    RatedTable {
        title: dimension.title(),
        headers: metrics_headers(dimension),
        rows: rate_rows(rows),
    }
}

fn rated_cell(value: MetricValue, rating: Rating) -> String {
    format!("{value}{}", rating.marker())
}

/// Render a metrics table as aligned plain text with rating markers.
pub fn render_table(dimension: GroupDimension, rows: &[MetricsRow]) -> String {
    let short_headers = [
        dimension.key_header(),
        "Avg start-done",
        "Avg call-mark",
        "Avg mark-done",
        "% on time",
        "< 10d",
        "10-16d",
        "> 16d",
    ];
    let body: Vec<[String; 8]> = rows
        .iter()
        .map(|row| {
            let ratings = RowRatings::of(row);
            [
                row.group.clone(),
                rated_cell(row.avg_start_to_complete, ratings.start_to_complete),
                rated_cell(row.avg_call_to_mark, ratings.call_to_mark),
                rated_cell(row.avg_mark_to_complete, ratings.mark_to_complete),
                rated_cell(row.percent_on_time, ratings.on_time),
                row.jobs_under_10.to_string(),
                row.jobs_10_to_16.to_string(),
                row.jobs_over_16.to_string(),
            ]
        })
        .collect();

    let mut widths = short_headers.map(str::len);
    for cells in &body {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", dimension.title());
    let header_line: Vec<String> = short_headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{h:>w$}"))
        .collect();
    let _ = writeln!(out, "{}", header_line.join("  "));
    for cells in &body {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:>w$}"))
            .collect();
        let _ = writeln!(out, "{}", line.join("  "));
    }
    if body.is_empty() {
        let _ = writeln!(out, "(no groups)");
    }
    out
}
