pub mod cell;

pub use cell::CellValue;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Which tracker sheet a record set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sheet {
    Active,
    Archive,
}

impl Sheet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sheet::Active => "active",
            Sheet::Archive => "archive",
        }
    }

    /// Display title of the sheet in the tracker workbook.
    pub fn title(&self) -> &'static str {
        match self {
            Sheet::Active => "Main Installs",
            Sheet::Archive => ">90 Day Archive",
        }
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sheet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" | "main" => Ok(Sheet::Active),
            "archive" => Ok(Sheet::Archive),
            other => Err(Error::InvalidSheet(other.to_string())),
        }
    }
}

/// Named tracker columns the daily pass reads or carries explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    DropInstallDate,
    Call811Date,
    BeginWorkOn,
    Mark811Date,
    TicketExpirationDate,
    JobCompletedDate,
    Address,
    WorkAreaCode,
    Notes,
    Status,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::DropInstallDate,
        Column::Call811Date,
        Column::BeginWorkOn,
        Column::Mark811Date,
        Column::TicketExpirationDate,
        Column::JobCompletedDate,
        Column::Address,
        Column::WorkAreaCode,
        Column::Notes,
        Column::Status,
    ];

    /// Header text as it appears in the workbook.
    pub fn header(&self) -> &'static str {
        match self {
            Column::DropInstallDate => "Drop Installation Date",
            Column::Call811Date => "811 Called in Date",
            Column::BeginWorkOn => "Begin Work On",
            Column::Mark811Date => "811 Marked Date",
            Column::TicketExpirationDate => "Ticket Expiration Date",
            Column::JobCompletedDate => "Job Completed Date",
            Column::Address => "Address",
            Column::WorkAreaCode => "CO",
            Column::Notes => "Notes",
            Column::Status => "Status",
        }
    }

    /// Column name in the `job_records` table.
    pub fn sql_name(&self) -> &'static str {
        match self {
            Column::DropInstallDate => "drop_install_date",
            Column::Call811Date => "call811_date",
            Column::BeginWorkOn => "begin_work_on",
            Column::Mark811Date => "mark811_date",
            Column::TicketExpirationDate => "ticket_expiration_date",
            Column::JobCompletedDate => "job_completed_date",
            Column::Address => "address",
            Column::WorkAreaCode => "work_area_code",
            Column::Notes => "notes",
            Column::Status => "status",
        }
    }

    /// Match a workbook header, ignoring case and surrounding whitespace.
    pub fn from_header(header: &str) -> Option<Column> {
        let wanted = header.trim();
        Column::ALL
            .into_iter()
            .find(|c| c.header().eq_ignore_ascii_case(wanted))
    }
}

/// One row of the tracker.
///
/// Columns the daily pass has no use for are kept in `extra_columns` so a
/// migrated row lands in the archive exactly as it left the active sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobRecord {
    pub drop_install_date: CellValue,
    pub call811_date: CellValue,
    pub begin_work_on: CellValue,
    pub mark811_date: CellValue,
    pub ticket_expiration_date: CellValue,
    pub job_completed_date: CellValue,
    pub address: CellValue,
    pub work_area_code: CellValue,
    pub notes: CellValue,
    pub status: CellValue,
    pub extra_columns: BTreeMap<String, CellValue>,
}

impl JobRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter, mostly for fixtures and imports.
    pub fn with(mut self, column: Column, value: impl Into<CellValue>) -> Self {
        *self.get_mut(column) = value.into();
        self
    }

    pub fn get(&self, column: Column) -> &CellValue {
        match column {
            Column::DropInstallDate => &self.drop_install_date,
            Column::Call811Date => &self.call811_date,
            Column::BeginWorkOn => &self.begin_work_on,
            Column::Mark811Date => &self.mark811_date,
            Column::TicketExpirationDate => &self.ticket_expiration_date,
            Column::JobCompletedDate => &self.job_completed_date,
            Column::Address => &self.address,
            Column::WorkAreaCode => &self.work_area_code,
            Column::Notes => &self.notes,
            Column::Status => &self.status,
        }
    }

    pub fn get_mut(&mut self, column: Column) -> &mut CellValue {
        match column {
            Column::DropInstallDate => &mut self.drop_install_date,
            Column::Call811Date => &mut self.call811_date,
            Column::BeginWorkOn => &mut self.begin_work_on,
            Column::Mark811Date => &mut self.mark811_date,
            Column::TicketExpirationDate => &mut self.ticket_expiration_date,
            Column::JobCompletedDate => &mut self.job_completed_date,
            Column::Address => &mut self.address,
            Column::WorkAreaCode => &mut self.work_area_code,
            Column::Notes => &mut self.notes,
            Column::Status => &mut self.status,
        }
    }

    /// True when the status cell is text equal to "completed", ignoring case.
    pub fn is_completed(&self) -> bool {
        self.status
            .as_text()
            .is_some_and(|s| s.eq_ignore_ascii_case("completed"))
    }

    /// Build a record from one JSON row object keyed by workbook headers.
    pub fn from_json_row(row: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut record = JobRecord::new();
        for (header, value) in row {
            let cell = CellValue::from_json(value);
            match Column::from_header(header) {
                Some(column) => *record.get_mut(column) = cell,
                None => {
                    record.extra_columns.insert(header.clone(), cell);
                }
            }
        }
        record
    }

    /// Inverse of [`JobRecord::from_json_row`]: named columns first, then extras.
    pub fn to_json_row(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for column in Column::ALL {
            map.insert(column.header().to_string(), json_cell(self.get(column)));
        }
        for (header, cell) in &self.extra_columns {
            map.insert(header.clone(), json_cell(cell));
        }
        serde_json::Value::Object(map)
    }
}

fn json_cell(cell: &CellValue) -> serde_json::Value {
    serde_json::to_value(cell).unwrap_or(serde_json::Value::Null)
}

/// Parse an import document: a JSON array of row objects.
pub fn parse_record_set(json: &str) -> Result<Vec<JobRecord>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let rows = value
        .as_array()
        .ok_or_else(|| Error::Import("expected a JSON array of row objects".into()))?;
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            row.as_object()
                .map(JobRecord::from_json_row)
                .ok_or_else(|| Error::Import(format!("row {i} is not an object")))
        })
        .collect()
}
