// src/rotation.rs
use chrono::NaiveDate;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};
use tracing::{debug, info, warn};

use crate::dates::{format_date, parse_required_date};
use crate::patterns::PatternRecord;
use crate::AppError;

/// Length of the work/rest rotation, in days.
pub const CYCLE_LENGTH: i64 = 14;
/// The first `WORK_DAYS` days of each cycle are worked, the rest are off.
pub const WORK_DAYS: u32 = 10;

/// Anchor used when no configuration says otherwise (Tuesday 17 Dec 2024).
pub fn default_anchor() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 17).unwrap_or(NaiveDate::MIN)
}

/// 1-based position of `date` in the 14-day cycle starting at `anchor`.
/// Dates before the anchor wrap around the same cycle.
pub fn cycle_day(anchor: NaiveDate, date: NaiveDate) -> u32 {
    let offset = date.signed_duration_since(anchor).num_days();
    (offset.rem_euclid(CYCLE_LENGTH) + 1) as u32
}

pub fn works_in_cycle(cycle_day: u32) -> bool {
    (1..=WORK_DAYS).contains(&cycle_day)
}

// Raw file layout; dates are validated when converted.
#[derive(Debug, Deserialize)]
struct RotationFile {
    #[serde(default)]
    default_anchor: Option<String>,
    #[serde(default)]
    employees: Vec<String>,
    #[serde(default)]
    anchors: BTreeMap<String, String>,
}

/// Which employees follow the 10/4 rotation and where each one's cycle starts.
/// Kept apart from the derived [`PatternRecord`]s; attendance counts cannot reveal it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationConfig {
    pub default_anchor: NaiveDate,
    /// Employees in rotation in addition to records flagged `rotation_mode`.
    pub employees: BTreeSet<String>,
    /// Only consulted for employees that are in rotation.
    pub anchors: BTreeMap<String, NaiveDate>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self::new(default_anchor())
    }
}

impl RotationConfig {
    pub fn new(default_anchor: NaiveDate) -> Self {
        Self {
            default_anchor,
            employees: BTreeSet::new(),
            anchors: BTreeMap::new(),
        }
    }

    pub fn with_employee(mut self, name: &str) -> Self {
        self.employees.insert(name.to_string());
        self
    }

    pub fn with_anchor(mut self, name: &str, anchor: NaiveDate) -> Self {
        self.anchors.insert(name.to_string(), anchor);
        self
    }

    pub fn is_rotation(&self, record: &PatternRecord) -> bool {
        record.rotation_mode || self.employees.contains(&record.name)
    }

    pub fn anchor_for(&self, name: &str) -> NaiveDate {
        self.anchors
            .get(name)
            .copied()
            .unwrap_or(self.default_anchor)
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let raw: RotationFile = serde_json::from_str(json)?;

        let default_anchor = match raw.default_anchor.as_deref() {
            Some(value) => parse_required_date("default_anchor", value)?,
            None => default_anchor(),
        };
        let mut config = Self::new(default_anchor);
        // Names are exact keys, the same as in the record file.
        for name in raw.employees.iter().filter(|name| !name.trim().is_empty()) {
            config = config.with_employee(name);
        }
        for (name, value) in raw.anchors {
            let anchor = parse_required_date(&format!("anchors.{}", name), &value)?;
            config.anchors.insert(name, anchor);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::MissingFile(path.to_path_buf()));
        }
        let config = Self::from_json(&fs::read_to_string(path)?)?;
        info!(
            "Rotation config from {}: {} employees, {} anchors, default anchor {}",
            path.display(),
            config.employees.len(),
            config.anchors.len(),
            format_date(config.default_anchor)
        );
        Ok(config)
    }

    /// Logs and returns configuration entries that do not match any record.
    pub fn check_against(&self, records: &[PatternRecord]) -> BTreeSet<&str> {
        let known: BTreeSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let unknown: BTreeSet<&str> = self
            .employees
            .iter()
            .chain(self.anchors.keys())
            .map(String::as_str)
            .filter(|name| !known.contains(name))
            .collect();
        for name in &unknown {
            warn!("Rotation config mentions unknown employee {}", name);
        }
        for record in records.iter().filter(|r| self.is_rotation(r)) {
            debug!(
                "{} rotates from anchor {}",
                record.name,
                format_date(self.anchor_for(&record.name))
            );
        }
        unknown
    }
}
