// src/calendar.rs
use chrono::{Datelike, NaiveDate};
use csv::WriterBuilder;
use serde::{Serialize, Serializer};
use std::{io::Write, path::Path};
use tracing::{debug, info, warn};

use crate::dates::{format_date, weekday_number, DayType, HolidayCalendar};
use crate::patterns::PatternRecord;
use crate::rotation::{cycle_day, works_in_cycle, RotationConfig};
use crate::AppError;

pub const GROUP_A: &str = "A";
pub const GROUP_B: &str = "B";

/// Group on duty for `date`: "A" on even week offsets from `range_start`, "B" on odd ones.
pub fn active_group(range_start: NaiveDate, date: NaiveDate) -> &'static str {
    let weeks = date
        .signed_duration_since(range_start)
        .num_days()
        .div_euclid(7);
    if weeks.rem_euclid(2) == 0 {
        GROUP_A
    } else {
        GROUP_B
    }
}

/// `nomina_generada_17_12_24_a_31_12_26.csv` for the range 17/12/24 - 31/12/26.
pub fn default_output_name(start: &str, end: &str) -> String {
    format!(
        "nomina_generada_{}_a_{}.csv",
        start.replace('/', "_"),
        end.replace('/', "_")
    )
}

fn serialize_date<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_date(*date))
}

fn serialize_marker<S: Serializer>(worked: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *worked { "9" } else { "0" })
}

fn serialize_day_type<S: Serializer>(
    day_type: &DayType,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(day_type.label())
}

/// One projected payroll line. Field renames are the output file's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedRow {
    #[serde(rename = "Analista")]
    pub analyst: String,
    #[serde(rename = "Nombre")]
    pub name: String,
    #[serde(rename = "Rango Horario")]
    pub shift_label: String,
    #[serde(rename = "Fecha", serialize_with = "serialize_date")]
    pub date: NaiveDate,
    #[serde(rename = "Valor", serialize_with = "serialize_marker")]
    pub worked: bool,
    #[serde(rename = "Mes")]
    pub month: u32,
    #[serde(rename = "semana")]
    pub iso_week: u32,
    #[serde(rename = "Grupo")]
    pub group: String,
    #[serde(rename = "Dia de semana")]
    pub weekday: u32,
    #[serde(rename = "Festivo", serialize_with = "serialize_day_type")]
    pub day_type: DayType,
}

/// Replays pattern records over a date range.
pub struct CalendarGenerator<'a> {
    records: &'a [PatternRecord],
    rotation: &'a RotationConfig,
    holidays: &'a dyn HolidayCalendar,
}

impl<'a> CalendarGenerator<'a> {
    pub fn new(
        records: &'a [PatternRecord],
        rotation: &'a RotationConfig,
        holidays: &'a dyn HolidayCalendar,
    ) -> Self {
        Self {
            records,
            rotation,
            holidays,
        }
    }

    /// Whether `record` works on `date` when the projected range starts at `range_start`.
    pub fn works_on(
        &self,
        record: &PatternRecord,
        date: NaiveDate,
        day_type: DayType,
        range_start: NaiveDate,
    ) -> bool {
        if self.rotation.is_rotation(record) {
            let anchor = self.rotation.anchor_for(&record.name);
            return works_in_cycle(cycle_day(anchor, date));
        }

        let base_works = record.works_on_weekday(weekday_number(date));
        let group_matches = record.group == active_group(range_start, date);

        match day_type {
            DayType::Holiday => base_works && record.works_holidays && group_matches,
            DayType::Sunday => base_works && record.works_sundays && group_matches,
            DayType::Workday => base_works && group_matches,
        }
    }

    /// One row per (date, employee), dates ascending, employees in record order.
    /// An inverted range produces no rows.
    pub fn generate(&self, start: NaiveDate, end: NaiveDate) -> Vec<GeneratedRow> {
        if start > end {
            warn!(
                "Start date {} is after end date {}, nothing to generate",
                format_date(start),
                format_date(end)
            );
            return Vec::new();
        }

        let days = end.signed_duration_since(start).num_days() as usize + 1;
        let mut rows = Vec::with_capacity(days * self.records.len());

        for date in start.iter_days().take_while(|date| *date <= end) {
            let day_type = DayType::for_date(date, self.holidays);
            let weekday = weekday_number(date);
            let iso_week = date.iso_week().week();
            debug!(
                "{} weekday={} type={:?} group={}",
                format_date(date),
                weekday,
                day_type,
                active_group(start, date)
            );

            for record in self.records {
                rows.push(GeneratedRow {
                    analyst: String::new(),
                    name: record.name.clone(),
                    shift_label: record.shift_label.clone(),
                    date,
                    worked: self.works_on(record, date, day_type, start),
                    month: date.month(),
                    iso_week,
                    group: record.group.clone(),
                    weekday,
                    day_type,
                });
            }
        }

        info!(
            "Generated {} rows for {} employees from {} to {}",
            rows.len(),
            self.records.len(),
            format_date(start),
            format_date(end)
        );
        rows
    }
}

pub fn write_calendar_to<W: Write>(
    writer: W,
    rows: &[GeneratedRow],
    delimiter: u8,
) -> Result<(), AppError> {
    let mut csv_writer = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    if rows.is_empty() {
        // serialize() only emits the header together with the first row
        csv_writer.write_record([
            "Analista",
            "Nombre",
            "Rango Horario",
            "Fecha",
            "Valor",
            "Mes",
            "semana",
            "Grupo",
            "Dia de semana",
            "Festivo",
        ])?;
    }
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_calendar(path: &Path, rows: &[GeneratedRow], delimiter: u8) -> Result<(), AppError> {
    let file = std::fs::File::create(path)?;
    write_calendar_to(file, rows, delimiter)?;
    info!("Calendar written to {} ({} rows)", path.display(), rows.len());
    Ok(())
}
