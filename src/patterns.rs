// src/patterns.rs
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};
use tracing::{debug, info, warn};

use crate::dates::{weekday_name, DayType};
use crate::history::AttendanceObservation;
use crate::AppError;

// --- Pattern Records ---

/// Schedule pattern of one employee, as derived from attendance history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub name: String,
    pub shift_label: String,
    pub group: String,
    /// Weekday (1 = Monday .. 7 = Sunday) -> works that weekday.
    /// Weekdays never seen in the history have no entry.
    pub weekly_pattern: BTreeMap<u32, bool>,
    pub works_holidays: bool,
    pub works_sundays: bool,
    /// Maintained by hand, never derived from history.
    #[serde(default)]
    pub rotation_mode: bool,
}

impl PatternRecord {
    /// Absent weekdays count as "does not work".
    pub fn works_on_weekday(&self, weekday: u32) -> bool {
        self.weekly_pattern.get(&weekday).copied().unwrap_or(false)
    }

    pub fn working_days(&self) -> Vec<u32> {
        self.weekly_pattern
            .iter()
            .filter(|(_, works)| **works)
            .map(|(day, _)| *day)
            .collect()
    }

    pub fn working_day_names(&self) -> Vec<&'static str> {
        self.working_days()
            .into_iter()
            .filter_map(weekday_name)
            .collect()
    }
}

/// On-disk layout of the intermediate record file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternSet {
    pub employees: Vec<PatternRecord>,
}

// --- Extraction ---

#[derive(Debug, Default)]
struct EmployeeTally {
    shift_label: String,
    group: String,
    // Indexed by weekday number, slot 0 unused.
    worked: [u32; 8],
    not_worked: [u32; 8],
    works_holidays: bool,
    works_sundays: bool,
}

impl EmployeeTally {
    fn into_record(self, name: String) -> PatternRecord {
        let weekly_pattern = (1..=7u32)
            .filter_map(|day| {
                let worked = self.worked[day as usize];
                let total = worked + self.not_worked[day as usize];
                // Strict majority; a tie means "does not work".
                (total > 0).then(|| (day, worked * 2 > total))
            })
            .collect();

        PatternRecord {
            name,
            shift_label: self.shift_label,
            group: self.group,
            weekly_pattern,
            works_holidays: self.works_holidays,
            works_sundays: self.works_sundays,
            rotation_mode: false,
        }
    }
}

/// Accumulates attendance observations and derives one [`PatternRecord`] per employee.
#[derive(Debug, Default)]
pub struct PatternExtractor {
    tallies: BTreeMap<String, EmployeeTally>,
    skipped: usize,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, observation: &AttendanceObservation) {
        if observation.name.is_empty() || observation.shift_label.is_empty() {
            debug!("Skipping observation without name or shift: {:?}", observation);
            self.skipped += 1;
            return;
        }

        let tally = self.tallies.entry(observation.name.clone()).or_default();

        // First non-empty value wins, later ones are only reported.
        if tally.shift_label.is_empty() {
            tally.shift_label = observation.shift_label.clone();
        } else if tally.shift_label != observation.shift_label {
            debug!(
                "Ignoring shift '{}' for {}, keeping '{}'",
                observation.shift_label, observation.name, tally.shift_label
            );
        }
        if tally.group.is_empty() {
            tally.group = observation.group.clone();
        } else if !observation.group.is_empty() && tally.group != observation.group {
            debug!(
                "Ignoring group '{}' for {}, keeping '{}'",
                observation.group, observation.name, tally.group
            );
        }

        if observation.date.is_none() {
            debug!(
                "Observation for {} has no valid date, not counted",
                observation.name
            );
            self.skipped += 1;
            return;
        }

        match observation.weekday {
            Some(day @ 1..=7) => {
                if observation.worked {
                    tally.worked[day as usize] += 1;
                } else {
                    tally.not_worked[day as usize] += 1;
                }
            }
            Some(day) => debug!(
                "Weekday {} for {} out of range, not counted",
                day, observation.name
            ),
            None => {}
        }

        if observation.worked {
            match observation.day_type {
                Some(DayType::Holiday) => tally.works_holidays = true,
                Some(DayType::Sunday) => tally.works_sundays = true,
                _ => {}
            }
        }
    }

    /// Records sorted by employee name.
    pub fn finish(self) -> Vec<PatternRecord> {
        let records: Vec<PatternRecord> = self
            .tallies
            .into_iter()
            .map(|(name, tally)| tally.into_record(name))
            .collect();
        info!(
            "Derived patterns for {} employees ({} observations skipped)",
            records.len(),
            self.skipped
        );
        records
    }
}

pub fn extract_patterns<'a, I>(observations: I) -> Vec<PatternRecord>
where
    I: IntoIterator<Item = &'a AttendanceObservation>,
{
    let mut extractor = PatternExtractor::new();
    for observation in observations {
        extractor.observe(observation);
    }
    extractor.finish()
}

/// Copies hand-set `rotation_mode` flags from a previous record set onto fresh records.
/// Returns how many flags were carried over.
pub fn carry_rotation_flags(records: &mut [PatternRecord], previous: &[PatternRecord]) -> usize {
    let flagged: HashMap<&str, bool> = previous
        .iter()
        .filter(|record| record.rotation_mode)
        .map(|record| (record.name.as_str(), true))
        .collect();

    let mut carried = 0;
    for record in records.iter_mut() {
        if flagged.contains_key(record.name.as_str()) {
            record.rotation_mode = true;
            carried += 1;
        }
    }
    if carried < flagged.len() {
        warn!(
            "{} rotation flags belong to employees missing from the new history",
            flagged.len() - carried
        );
    }
    carried
}

// --- Record file ---

pub fn load_patterns(path: &Path) -> Result<Vec<PatternRecord>, AppError> {
    if !path.exists() {
        return Err(AppError::MissingFile(path.to_path_buf()));
    }
    let json_string = fs::read_to_string(path)?;
    let set: PatternSet = serde_json::from_str(&json_string)?;
    info!(
        "Loaded {} pattern records from {}",
        set.employees.len(),
        path.display()
    );
    Ok(dedup_by_name(set.employees))
}

/// Keeps the first position of each name; a later duplicate replaces the earlier values.
fn dedup_by_name(records: Vec<PatternRecord>) -> Vec<PatternRecord> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<PatternRecord> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(&record.name) {
            Some(&idx) => {
                warn!("Duplicate pattern record for {}, using the later one", record.name);
                unique[idx] = record;
            }
            None => {
                positions.insert(record.name.clone(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

pub fn save_patterns(path: &Path, records: &[PatternRecord]) -> Result<(), AppError> {
    let set = PatternSet {
        employees: records.to_vec(),
    };
    let json_string = serde_json::to_string_pretty(&set)?;
    fs::write(path, json_string)?;
    info!("Pattern records saved to {}", path.display());
    Ok(())
}

// --- Summaries ---

fn yes_no(value: bool) -> &'static str {
    if value {
        "Sí"
    } else {
        "No"
    }
}

const SUMMARY_HEADER: [&str; 7] = [
    "Nombre",
    "Horario",
    "Grupo",
    "Días Laborales",
    "Trabaja Festivos",
    "Trabaja Domingos",
    "Patrón Semanal (L=1, M=2, X=3, J=4, V=5, S=6, D=7)",
];

#[derive(Debug, Serialize)]
struct PatternSummaryRow<'a> {
    #[serde(rename = "Nombre")]
    name: &'a str,
    #[serde(rename = "Horario")]
    shift_label: &'a str,
    #[serde(rename = "Grupo")]
    group: &'a str,
    #[serde(rename = "Días Laborales")]
    working_days: String,
    #[serde(rename = "Trabaja Festivos")]
    works_holidays: &'static str,
    #[serde(rename = "Trabaja Domingos")]
    works_sundays: &'static str,
    #[serde(rename = "Patrón Semanal (L=1, M=2, X=3, J=4, V=5, S=6, D=7)")]
    weekly_pattern: String,
}

impl<'a> From<&'a PatternRecord> for PatternSummaryRow<'a> {
    fn from(record: &'a PatternRecord) -> Self {
        let weekly_pattern = record
            .weekly_pattern
            .iter()
            .map(|(day, works)| format!("{}:{}", day, yes_no(*works)))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            name: &record.name,
            shift_label: &record.shift_label,
            group: &record.group,
            working_days: record.working_day_names().join(", "),
            works_holidays: yes_no(record.works_holidays),
            works_sundays: yes_no(record.works_sundays),
            weekly_pattern,
        }
    }
}

/// Writes the simplified, human-oriented pattern table.
pub fn write_pattern_summary(
    path: &Path,
    records: &[PatternRecord],
    delimiter: u8,
) -> Result<(), AppError> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;
    if records.is_empty() {
        // serialize() only emits the header together with the first row
        writer.write_record(SUMMARY_HEADER)?;
    }
    for record in records {
        writer.serialize(PatternSummaryRow::from(record))?;
    }
    writer.flush()?;
    info!("Pattern summary saved to {}", path.display());
    Ok(())
}

pub fn format_summary(records: &[PatternRecord]) -> String {
    let rule = "=".repeat(80);
    let mut out = format!("{}\nRESUMEN DE PATRONES\n{}\n", rule, rule);

    for record in records {
        out.push_str(&format!(
            "\n{}\n  Horario: {}\n  Grupo: {}\n  Días laborales: {}\n",
            record.name,
            record.shift_label,
            record.group,
            record.working_day_names().join(", ")
        ));
        out.push_str(&format!(
            "  Trabaja festivos: {}\n  Trabaja domingos: {}\n",
            yes_no(record.works_holidays),
            yes_no(record.works_sundays)
        ));
        if record.rotation_mode {
            out.push_str("  Rotación: 10 días trabajo / 4 descanso\n");
        }
    }
    out
}
