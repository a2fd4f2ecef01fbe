use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::record::JobRecord;

static RE_MONTH_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(0[1-9]|1[0-2])-(\d{4})$").unwrap());

/// Each calendar year advances a month's sort weight by this much, so that
/// `month + year_offset` orders buckets chronologically.
const YEAR_WEIGHT_STEP: u32 = 100;

/// Derives the aggregation key of a record along one grouping dimension.
pub trait GroupResolver {
    type Key: Clone + Eq + Hash + fmt::Display;

    /// The record's group, or `None` when its grouping data is malformed.
    fn resolve(&self, record: &JobRecord) -> Option<Self::Key>;

    /// Arrange a freshly collected universe in report order.
    /// Default keeps first-seen order.
    fn order(&self, _keys: &mut [Self::Key]) {}
}

/// Union of every key resolvable from the given record sets, in report order.
pub fn group_universe<R: GroupResolver>(resolver: &R, sets: &[&[JobRecord]]) -> Vec<R::Key> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for record in sets.iter().flat_map(|set| set.iter()) {
        if let Some(key) = resolver.resolve(record) {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    }
    resolver.order(&mut keys);
    keys
}

// ── Work areas ─────────────────────────────────────────────────────

/// Two-letter work-area code, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AreaCode(String);

impl AreaCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_uppercase();
        (code.chars().count() == 2).then_some(AreaCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AreaCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Groups by the `CO` column. Only text cells qualify.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaResolver;

impl GroupResolver for AreaResolver {
    type Key = AreaCode;

    fn resolve(&self, record: &JobRecord) -> Option<AreaCode> {
        AreaCode::parse(record.work_area_code.as_text()?)
    }
}

// ── Months ─────────────────────────────────────────────────────────

/// Inclusive range of calendar years a month bucket may fall in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupportedYears {
    first: i32,
    last: i32,
}

impl SupportedYears {
    pub const DEFAULT_FIRST: i32 = 2023;
    pub const DEFAULT_LAST: i32 = 2040;

    pub fn new(first: i32, last: i32) -> Result<Self> {
        if first > last {
            return Err(Error::Config(format!(
                "supported year range is empty: {first} > {last}"
            )));
        }
        Ok(Self { first, last })
    }

    pub fn first(&self) -> i32 {
        self.first
    }

    pub fn last(&self) -> i32 {
        self.last
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.first..=self.last).contains(&year)
    }

    /// Weight contributed by the year; `None` outside the range.
    pub fn year_offset(&self, year: i32) -> Option<u32> {
        if !self.contains(year) {
            return None;
        }
        let index = u32::try_from(year - self.first).ok()? + 1;
        index.checked_mul(YEAR_WEIGHT_STEP)
    }
}

impl Default for SupportedYears {
    fn default() -> Self {
        Self {
            first: Self::DEFAULT_FIRST,
            last: Self::DEFAULT_LAST,
        }
    }
}

/// Month-year bucket, rendered as `MM-YYYY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Parse the `MM-YYYY` form written to the month metrics table.
    pub fn parse(s: &str) -> Option<Self> {
        let caps = RE_MONTH_KEY.captures(s.trim())?;
        Self::new(caps[2].parse().ok()?, caps[1].parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn sort_weight(&self, years: &SupportedYears) -> Option<u32> {
        Some(self.month + years.year_offset(self.year)?)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{}", self.month, self.year)
    }
}

/// Groups by the month of the drop installation date.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonthResolver {
    years: SupportedYears,
}

impl MonthResolver {
    pub fn new(years: SupportedYears) -> Self {
        Self { years }
    }
}

impl GroupResolver for MonthResolver {
    type Key = MonthKey;

    fn resolve(&self, record: &JobRecord) -> Option<MonthKey> {
        let date = record.drop_install_date.as_date()?;
        if !self.years.contains(date.year()) {
            return None;
        }
        MonthKey::new(date.year(), date.month())
    }

    fn order(&self, keys: &mut [MonthKey]) {
        keys.sort_by_key(|k| k.sort_weight(&self.years).unwrap_or(u32::MAX));
    }
}
