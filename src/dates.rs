// src/dates.rs
use chrono::{Datelike, NaiveDate, Weekday};
use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::Path,
};
use tracing::{debug, info, warn};

use crate::AppError;

/// Date format used by every payroll file: day/month/2-digit-year.
pub const DATE_FORMAT: &str = "%d/%m/%y";

/// Parses a `DD/MM/YY` string. Returns `None` when the value is not a valid date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Like [`parse_date`], but for values the user supplied on purpose (CLI, config files).
pub fn parse_required_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    parse_date(value).ok_or_else(|| AppError::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// 1 = Monday .. 7 = Sunday
pub fn weekday_number(date: NaiveDate) -> u32 {
    date.weekday().number_from_monday()
}

/// Spanish day name used in the payroll summaries.
pub fn weekday_name(weekday: u32) -> Option<&'static str> {
    match weekday {
        1 => Some("Lunes"),
        2 => Some("Martes"),
        3 => Some("Miércoles"),
        4 => Some("Jueves"),
        5 => Some("Viernes"),
        6 => Some("Sábado"),
        7 => Some("Domingo"),
        _ => None,
    }
}

/// Classification of a calendar date used to gate the weekly pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayType {
    Workday,
    Sunday,
    Holiday,
}

impl DayType {
    /// Accepts the payroll's Spanish labels as well as the English ones.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Laboral" | "Workday" => Some(DayType::Workday),
            "Domingo" | "Sunday" => Some(DayType::Sunday),
            "Festivo" | "Holiday" => Some(DayType::Holiday),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayType::Workday => "Laboral",
            DayType::Sunday => "Domingo",
            DayType::Holiday => "Festivo",
        }
    }

    /// Sunday wins over a holiday falling on the same date.
    pub fn for_date(date: NaiveDate, holidays: &dyn HolidayCalendar) -> Self {
        if date.weekday() == Weekday::Sun {
            DayType::Sunday
        } else if holidays.is_holiday(date) {
            DayType::Holiday
        } else {
            DayType::Workday
        }
    }
}

// --- Holiday lookup ---

pub trait HolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// No date is a holiday.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

impl HolidayCalendar for HashSet<NaiveDate> {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.contains(&date)
    }
}

impl HolidayCalendar for BTreeSet<NaiveDate> {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.contains(&date)
    }
}

/// Reads a holiday list: one `DD/MM/YY` per line, blank lines and `#` comments ignored.
/// Lines that are not dates are logged and skipped.
pub fn load_holidays(path: &Path) -> Result<BTreeSet<NaiveDate>, AppError> {
    if !path.exists() {
        return Err(AppError::MissingFile(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let mut holidays = BTreeSet::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_date(line) {
            Some(date) => {
                holidays.insert(date);
            }
            None => warn!(
                "Ignoring unparseable holiday '{}' at {}:{}",
                line,
                path.display(),
                line_no + 1
            ),
        }
    }

    info!("Loaded {} holidays from {}", holidays.len(), path.display());
    debug!("Holidays: {:?}", holidays);
    Ok(holidays)
}
