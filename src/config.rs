use std::path::PathBuf;

use rusqlite::Connection;
use serde::Serialize;

use crate::archive::ArchivePolicy;
use crate::error::{Error, Result};
use crate::metrics::SupportedYears;
use crate::storage::{data_dir, repository};

pub const KEY_ARCHIVE_AFTER_DAYS: &str = "archive_after_days";
pub const KEY_FIRST_SUPPORTED_YEAR: &str = "first_supported_year";
pub const KEY_LAST_SUPPORTED_YEAR: &str = "last_supported_year";
pub const KEY_BACKUP_DIR: &str = "backup_dir";

/// Every key the tracker reads from `app_config`.
pub const KNOWN_KEYS: [&str; 4] = [
    KEY_ARCHIVE_AFTER_DAYS,
    KEY_FIRST_SUPPORTED_YEAR,
    KEY_LAST_SUPPORTED_YEAR,
    KEY_BACKUP_DIR,
];

/// Settings for a daily run, loaded from `app_config` over built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerConfig {
    pub archive_policy: ArchivePolicy,
    pub years: SupportedYears,
    /// Root of the backup tree; `None` when no home directory is known.
    pub backup_dir: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            archive_policy: ArchivePolicy::default(),
            years: SupportedYears::default(),
            backup_dir: default_backup_dir(),
        }
    }
}

fn default_backup_dir() -> Option<PathBuf> {
    data_dir().ok().map(|dir| dir.join("backups"))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a whole number, got {raw:?}")))
}

impl TrackerConfig {
    /// Read the stored settings. Unset keys fall back to defaults.
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = repository::get_config(conn, KEY_ARCHIVE_AFTER_DAYS)? {
            let days: i64 = parse_number(KEY_ARCHIVE_AFTER_DAYS, &raw)?;
            if days < 0 {
                return Err(Error::Config(format!(
                    "{KEY_ARCHIVE_AFTER_DAYS} must not be negative, got {days}"
                )));
            }
            config.archive_policy = ArchivePolicy::new(days);
        }

        let first = match repository::get_config(conn, KEY_FIRST_SUPPORTED_YEAR)? {
            Some(raw) => parse_number(KEY_FIRST_SUPPORTED_YEAR, &raw)?,
            None => config.years.first(),
        };
        let last = match repository::get_config(conn, KEY_LAST_SUPPORTED_YEAR)? {
            Some(raw) => parse_number(KEY_LAST_SUPPORTED_YEAR, &raw)?,
            None => config.years.last(),
        };
        config.years = SupportedYears::new(first, last)?;

        if let Some(raw) = repository::get_config(conn, KEY_BACKUP_DIR)? {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Err(Error::Config(format!("{KEY_BACKUP_DIR} must not be empty")));
            }
            config.backup_dir = Some(PathBuf::from(trimmed));
        }

        Ok(config)
    }
}

/// Reject unknown keys and values `TrackerConfig::load` would refuse.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        KEY_ARCHIVE_AFTER_DAYS => {
            let days: i64 = parse_number(key, value)?;
            if days < 0 {
                return Err(Error::Config(format!("{key} must not be negative")));
            }
        }
        KEY_FIRST_SUPPORTED_YEAR | KEY_LAST_SUPPORTED_YEAR => {
            parse_number::<i32>(key, value)?;
        }
        KEY_BACKUP_DIR => {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{key} must not be empty")));
            }
        }
        other => {
            return Err(Error::Config(format!(
                "unknown key {other:?} (expected one of: {})",
                KNOWN_KEYS.join(", ")
            )))
        }
    }
    Ok(())
}

/// Validate and persist one setting.
///
/// A year bound is also checked against the other stored bound, so the
/// saved pair always forms a non-empty range. An unreadable counterpart is
/// left for `TrackerConfig::load` to report.
pub fn store_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    validate_setting(key, value)?;
    let value = value.trim();

    let other = match key {
        KEY_FIRST_SUPPORTED_YEAR => Some((KEY_LAST_SUPPORTED_YEAR, SupportedYears::DEFAULT_LAST)),
        KEY_LAST_SUPPORTED_YEAR => Some((KEY_FIRST_SUPPORTED_YEAR, SupportedYears::DEFAULT_FIRST)),
        _ => None,
    };
    if let Some((other_key, default)) = other {
        let year: i32 = parse_number(key, value)?;
        let other_year = match repository::get_config(conn, other_key)? {
            Some(raw) => parse_number(other_key, &raw).ok(),
            None => Some(default),
        };
        if let Some(other_year) = other_year {
            if key == KEY_FIRST_SUPPORTED_YEAR {
                SupportedYears::new(year, other_year)?;
            } else {
                SupportedYears::new(other_year, year)?;
            }
        }
    }

    repository::set_config(conn, key, value)?;
    Ok(())
}
