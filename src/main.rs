// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    collections::BTreeSet,
    io::{self, BufRead, Write},
    path::PathBuf,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod calendar;
mod config;
mod dates;
mod history;
mod patterns;
mod rotation;


use calendar::{default_output_name, write_calendar, CalendarGenerator};
use config::AppConfig;
use dates::{load_holidays, parse_required_date, HolidayCalendar, NoHolidays};
use history::read_history;
use patterns::{
    carry_rotation_flags, extract_patterns, format_summary, load_patterns, save_patterns,
    write_pattern_summary,
};
use rotation::RotationConfig;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON serialization/deserialization failed: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),
    #[error("Invalid date for {field}: '{value}' (expected DD/MM/YY)")]
    InvalidDate { field: String, value: String },
    #[error("Delimiter must be a single ASCII character, got '{0}'")]
    InvalidDelimiter(String),
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
}

#[derive(Parser)]
#[command(name = "payroll-patterns")]
#[command(version)]
#[command(
    about = "Derives weekly work patterns from payroll history and projects a payroll calendar",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extracts per-employee patterns from an attendance history CSV
    Analyze {
        /// History CSV (header row + one row per employee and day)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Pattern record file (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Simplified pattern table (CSV)
        #[arg(short, long)]
        summary: Option<PathBuf>,

        /// Do not print the per-employee summary
        #[arg(short, long)]
        quiet: bool,
    },
    /// Generates the payroll calendar for a date range from the pattern records
    Generate {
        /// Pattern record file (JSON)
        #[arg(short, long)]
        patterns: Option<PathBuf>,

        /// First day, DD/MM/YY
        #[arg(short, long)]
        start: Option<String>,

        /// Last day (inclusive), DD/MM/YY
        #[arg(short, long)]
        end: Option<String>,

        /// Output CSV, defaults to nomina_generada_<start>_a_<end>.csv
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rotation config (JSON)
        #[arg(short, long)]
        rotation: Option<PathBuf>,

        /// Holiday list, one DD/MM/YY per line
        #[arg(long)]
        holidays: Option<PathBuf>,

        /// Use the configured default dates instead of asking
        #[arg(long)]
        no_prompt: bool,
    },
    /// Prints the summary of an existing pattern record file
    Show {
        #[arg(short, long)]
        patterns: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

/// Asks for a value on `output`, returning `default` when the answer is blank.
fn prompt_with_default<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: &str,
) -> io::Result<String> {
    write!(output, "{} (DD/MM/YY) o Enter para usar {}: ", label, default)?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}

fn resolve_date(
    given: Option<String>,
    label: &str,
    default: &str,
    no_prompt: bool,
) -> Result<String> {
    match given {
        Some(value) => Ok(value),
        None if no_prompt => Ok(default.to_string()),
        None => {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            prompt_with_default(&mut stdin.lock(), &mut stdout, label, default)
                .context("Failed to read date from stdin")
        }
    }
}

fn run_analyze(
    config: &AppConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    summary: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let delimiter = config.delimiter_byte()?;
    let input = input.unwrap_or_else(|| config.history_path.clone());
    let output = output.unwrap_or_else(|| config.patterns_path.clone());
    let summary = summary.unwrap_or_else(|| config.summary_path.clone());

    println!("Analizando patrones de nómina...");
    let observations = read_history(&input, delimiter)
        .with_context(|| format!("Failed to read history {}", input.display()))?;
    let mut records = extract_patterns(&observations);
    println!("Encontrados {} empleados", records.len());

    // An unreadable record file may still hold hand-set rotation flags; leave it alone.
    if output.exists() {
        let previous = load_patterns(&output).with_context(|| {
            format!(
                "Existing record file {} is unreadable; fix or move it before re-analyzing",
                output.display()
            )
        })?;
        let carried = carry_rotation_flags(&mut records, &previous);
        info!("Kept {} rotation flags from {}", carried, output.display());
    }

    save_patterns(&output, &records)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("✓ Configuración guardada en: {}", output.display());

    write_pattern_summary(&summary, &records, delimiter)
        .with_context(|| format!("Failed to write {}", summary.display()))?;
    println!("✓ CSV simplificado guardado en: {}", summary.display());

    if !quiet {
        println!();
        print!("{}", format_summary(&records));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_generate(
    config: &AppConfig,
    patterns: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    output: Option<PathBuf>,
    rotation: Option<PathBuf>,
    holidays: Option<PathBuf>,
    no_prompt: bool,
) -> Result<()> {
    let delimiter = config.delimiter_byte()?;
    let patterns = patterns.unwrap_or_else(|| config.patterns_path.clone());
    let records = load_patterns(&patterns)
        .with_context(|| format!("Failed to load pattern records {}", patterns.display()))?;

    let rotation = match rotation.or_else(|| config.rotation_path.clone()) {
        Some(path) => RotationConfig::load(&path)
            .with_context(|| format!("Failed to load rotation config {}", path.display()))?,
        None => RotationConfig::default(),
    };
    rotation.check_against(&records);

    let holiday_set: Option<BTreeSet<_>> = match holidays.or_else(|| config.holidays_path.clone()) {
        Some(path) => Some(
            load_holidays(&path)
                .with_context(|| format!("Failed to load holidays {}", path.display()))?,
        ),
        None => None,
    };
    let holiday_calendar: &dyn HolidayCalendar = match &holiday_set {
        Some(set) => set,
        None => &NoHolidays,
    };

    let start_text = resolve_date(start, "Fecha inicio", &config.default_start, no_prompt)?;
    let end_text = resolve_date(end, "Fecha fin", &config.default_end, no_prompt)?;
    let start_date = parse_required_date("start", &start_text)?;
    let end_date = parse_required_date("end", &end_text)?;

    let generator = CalendarGenerator::new(&records, &rotation, holiday_calendar);
    let rows = generator.generate(start_date, end_date);

    let output =
        output.unwrap_or_else(|| PathBuf::from(default_output_name(&start_text, &end_text)));
    write_calendar(&output, &rows, delimiter)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Nómina generada: {}", output.display());
    println!("  Período: {} a {}", start_text, end_text);
    println!("  Total de registros: {}", rows.len());
    Ok(())
}

fn run_show(config: &AppConfig, patterns: Option<PathBuf>) -> Result<()> {
    let patterns = patterns.unwrap_or_else(|| config.patterns_path.clone());
    let records = load_patterns(&patterns)
        .with_context(|| format!("Failed to load pattern records {}", patterns.display()))?;
    print!("{}", format_summary(&records));
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded: {:?}", config);

    match Cli::parse().command {
        Commands::Analyze {
            input,
            output,
            summary,
            quiet,
        } => run_analyze(&config, input, output, summary, quiet),
        Commands::Generate {
            patterns,
            start,
            end,
            output,
            rotation,
            holidays,
            no_prompt,
        } => run_generate(
            &config, patterns, start, end, output, rotation, holidays, no_prompt,
        ),
        Commands::Show { patterns } => run_show(&config, patterns),
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_prompt_blank_answer_uses_default() {
        let mut input = io::Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();
        let value =
            prompt_with_default(&mut input, &mut output, "Fecha inicio", "17/12/24").unwrap();

        assert_eq!(value, "17/12/24");
        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Enter para usar 17/12/24"));
    }

    #[test]
    fn test_prompt_answer_is_trimmed() {
        let mut input = io::Cursor::new(b"  01/01/25 \n".to_vec());
        let mut output = Vec::new();
        let value = prompt_with_default(&mut input, &mut output, "Fecha fin", "31/12/26").unwrap();
        assert_eq!(value, "01/01/25");
    }

    #[test]
    fn test_resolve_date_without_prompt() {
        assert_eq!(resolve_date(None, "x", "17/12/24", true).unwrap(), "17/12/24");
        assert_eq!(
            resolve_date(Some("02/02/25".into()), "x", "17/12/24", false).unwrap(),
            "02/02/25"
        );
    }

    const HISTORY: &str = "Analista;Nombre;Rango Horario;Fecha;Valor;Mes;semana;Grupo;Dia de semana;Festivo
;Ana;07:00-15:00;16/12/24;9;12;51;A;1;Laboral
;Ana;07:00-15:00;18/12/24;9;12;51;A;3;Laboral
;Ana;07:00-15:00;22/12/24;0;12;51;A;7;Domingo
;Luis;15:00-23:00;17/12/24;9;12;51;B;2;Laboral
;Luis;15:00-23:00;25/12/24;9;12;52;B;3;Festivo
";

    fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::from_vars(Vec::new()).unwrap();
        config.history_path = dir.join("historial.csv");
        config.patterns_path = dir.join("patrones.json");
        config.summary_path = dir.join("resumen.csv");
        config
    }

    fn data_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_analyze_keeps_rotation_flag_and_generate_covers_range() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.history_path, HISTORY).unwrap();

        run_analyze(&config, None, None, None, true).unwrap();
        let mut records = load_patterns(&config.patterns_path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.rotation_mode));
        assert!(config.summary_path.exists());

        records[1].rotation_mode = true;
        save_patterns(&config.patterns_path, &records).unwrap();
        run_analyze(&config, None, None, None, true).unwrap();
        let records = load_patterns(&config.patterns_path).unwrap();
        assert!(!records[0].rotation_mode);
        assert!(records[1].rotation_mode, "hand-set flag survives re-analysis");

        let output = dir.path().join("nomina.csv");
        run_generate(
            &config,
            None,
            Some("17/12/24".to_string()),
            Some("30/12/24".to_string()),
            Some(output.clone()),
            None,
            None,
            true,
        )
        .unwrap();
        let rows = data_lines(&output);
        assert_eq!(rows.len(), 14 * 2);
        // Luis rotates from 17/12/24: days 11..=14 of the cycle are off.
        assert!(rows.contains(&";Luis;15:00-23:00;26/12/24;9;12;52;B;4;Laboral".to_string()));
        assert!(rows.contains(&";Luis;15:00-23:00;27/12/24;0;12;52;B;5;Laboral".to_string()));
    }

    #[test]
    fn test_generate_holiday_flag_overrides_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        std::fs::write(&config.history_path, HISTORY).unwrap();
        run_analyze(&config, None, None, None, true).unwrap();

        let configured = dir.path().join("festivos_config.txt");
        std::fs::write(&configured, "25/12/24\n").unwrap();
        let flagged = dir.path().join("festivos_flag.txt");
        std::fs::write(&flagged, "18/12/24\n").unwrap();
        config.holidays_path = Some(configured);
        let output = dir.path().join("nomina.csv");
        let generate = |holidays: Option<PathBuf>| {
            run_generate(
                &config,
                None,
                Some("17/12/24".to_string()),
                Some("25/12/24".to_string()),
                Some(output.clone()),
                None,
                holidays,
                true,
            )
            .unwrap();
            data_lines(&output)
        };

        let rows = generate(None);
        assert_eq!(rows.len(), 9 * 2);
        assert!(rows.iter().any(|r| r.contains(";25/12/24;") && r.ends_with("Festivo")));
        assert!(rows.iter().all(|r| !r.contains(";18/12/24;") || r.ends_with("Laboral")));

        let rows = generate(Some(flagged));
        assert!(rows.iter().any(|r| r.contains(";18/12/24;") && r.ends_with("Festivo")));
        assert!(rows.iter().all(|r| !r.contains(";25/12/24;") || r.ends_with("Laboral")));
    }

    #[test]
    fn test_analyze_refuses_to_overwrite_unreadable_record_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.history_path, HISTORY).unwrap();
        std::fs::write(&config.patterns_path, "{ hand edited, broken").unwrap();

        assert!(run_analyze(&config, None, None, None, true).is_err());
        assert_eq!(
            std::fs::read_to_string(&config.patterns_path).unwrap(),
            "{ hand edited, broken"
        );
    }

    #[test]
    fn test_generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "payroll-patterns",
            "generate",
            "--start",
            "17/12/24",
            "-e",
            "31/12/24",
            "--no-prompt",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate {
                start,
                end,
                no_prompt,
                ..
            } => {
                assert_eq!(start.as_deref(), Some("17/12/24"));
                assert_eq!(end.as_deref(), Some("31/12/24"));
                assert!(no_prompt);
            }
            _ => panic!("Expected generate command"),
        }
    }
}
