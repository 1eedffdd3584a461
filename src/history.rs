// src/history.rs
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, info};

use crate::dates::{parse_date, DayType};
use crate::AppError;

/// Rows with fewer fields than this are dropped.
pub const MIN_HISTORY_FIELDS: usize = 10;

/// Marker the payroll uses for "worked that day".
pub const WORKED_MARKER: &str = "9";

mod column {
    pub const NAME: usize = 1;
    pub const SHIFT: usize = 2;
    pub const DATE: usize = 3;
    pub const VALUE: usize = 4;
    pub const GROUP: usize = 7;
    pub const WEEKDAY: usize = 8;
    pub const DAY_TYPE: usize = 9;
}

/// One historical payroll row.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceObservation {
    pub name: String,
    pub shift_label: String,
    pub date: Option<NaiveDate>,
    pub worked: bool,
    pub group: String,
    /// 1 = Monday .. 7 = Sunday; `None` when the cell is not a weekday number.
    pub weekday: Option<u32>,
    pub day_type: Option<DayType>,
}

impl AttendanceObservation {
    /// Builds an observation from a positional record. Short rows yield `None`.
    /// Emptiness of name/shift is left to the extractor.
    pub fn from_record(record: &StringRecord) -> Option<Self> {
        if record.len() < MIN_HISTORY_FIELDS {
            return None;
        }
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or_default();

        Some(Self {
            name: field(column::NAME).to_string(),
            shift_label: field(column::SHIFT).to_string(),
            date: parse_date(field(column::DATE)),
            worked: field(column::VALUE) == WORKED_MARKER,
            group: field(column::GROUP).to_string(),
            weekday: parse_weekday(field(column::WEEKDAY)),
            day_type: DayType::from_label(field(column::DAY_TYPE)),
        })
    }
}

/// Only plain digit strings in 1..=7 count as weekdays.
pub fn parse_weekday(value: &str) -> Option<u32> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse::<u32>().ok().filter(|day| (1..=7).contains(day))
}

pub fn read_history(path: &Path, delimiter: u8) -> Result<Vec<AttendanceObservation>, AppError> {
    if !path.exists() {
        return Err(AppError::MissingFile(path.to_path_buf()));
    }
    info!("Reading attendance history from {}", path.display());
    let file = File::open(path)?;
    read_history_from(file, delimiter)
}

/// Reads history rows from any reader. The first row is a header and is discarded.
pub fn read_history_from<R: Read>(
    reader: R,
    delimiter: u8,
) -> Result<Vec<AttendanceObservation>, AppError> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut observations = Vec::new();
    let mut skipped = 0usize;

    for (idx, result) in csv_reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e.into()),
            Err(e) => {
                debug!("Skipping unreadable history row {}: {}", idx + 2, e);
                skipped += 1;
                continue;
            }
        };
        match AttendanceObservation::from_record(&record) {
            Some(observation) => observations.push(observation),
            None => {
                debug!(
                    "Skipping history row {} with {} fields (need {})",
                    idx + 2,
                    record.len(),
                    MIN_HISTORY_FIELDS
                );
                skipped += 1;
            }
        }
    }

    info!(
        "Read {} history rows ({} skipped)",
        observations.len(),
        skipped
    );
    Ok(observations)
}

#[cfg(test)]
mod history_tests {
    use super::*;

    const HEADER: &str =
        "Analista;Nombre;Rango Horario;Fecha;Valor;Mes;semana;Grupo;Dia de semana;Festivo\n";

    #[test]
    fn test_reads_positional_columns() {
        let data = format!(
            "{}X;Ana Ruiz;07:00-15:00;16/12/24;9;12;51;A;1;Laboral\n",
            HEADER
        );
        let rows = read_history_from(data.as_bytes(), b';').unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.name, "Ana Ruiz");
        assert_eq!(row.shift_label, "07:00-15:00");
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 12, 16));
        assert!(row.worked);
        assert_eq!(row.group, "A");
        assert_eq!(row.weekday, Some(1));
        assert_eq!(row.day_type, Some(DayType::Workday));
    }

    #[test]
    fn test_header_is_discarded_and_short_rows_skipped() {
        let data = format!(
            "{}X;Ana Ruiz;07:00-15:00;16/12/24;9\n;Ana Ruiz;07:00-15:00;17/12/24;0;12;51;A;2;Laboral\n",
            HEADER
        );
        let rows = read_history_from(data.as_bytes(), b';').unwrap();

        assert_eq!(rows.len(), 1);
        assert!(!rows[0].worked, "anything but '9' means not worked");
    }

    #[test]
    fn test_header_only_yields_nothing() {
        let rows = read_history_from(HEADER.as_bytes(), b';').unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unparseable_cells_become_none() {
        let data = format!("{};Ana Ruiz;T1;someday;9;;;A;lunes;Otro\n", HEADER);
        let rows = read_history_from(data.as_bytes(), b';').unwrap();

        assert_eq!(rows[0].date, None);
        assert_eq!(rows[0].weekday, None);
        assert_eq!(rows[0].day_type, None);
    }

    #[test]
    fn test_parse_weekday_bounds() {
        assert_eq!(parse_weekday("7"), Some(7));
        assert_eq!(parse_weekday("0"), None);
        assert_eq!(parse_weekday("8"), None);
        assert_eq!(parse_weekday("+3"), None);
        assert_eq!(parse_weekday(""), None);
    }

    #[test]
    fn test_custom_delimiter() {
        let data = "h\nX,Ana,T1,16/12/24,9,12,51,B,1,Laboral\n";
        let rows = read_history_from(data.as_bytes(), b',').unwrap();
        assert_eq!(rows[0].group, "B");
    }
}
