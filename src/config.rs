// src/config.rs
use serde::Deserialize;
use std::path::PathBuf;

use crate::AppError;

pub const ENV_PREFIX: &str = "PAYROLL_";

fn default_history_path() -> PathBuf {
    PathBuf::from("Propuesta de Turno SEP Analistas 1 - NO TOCAR.csv")
}

fn default_patterns_path() -> PathBuf {
    PathBuf::from("patrones_nomina.json")
}

fn default_summary_path() -> PathBuf {
    PathBuf::from("patrones_nomina_simplificado.csv")
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_start() -> String {
    "17/12/24".to_string()
}

fn default_end() -> String {
    "31/12/26".to_string()
}

/// Settings read from `PAYROLL_*` environment variables (and `.env`).
/// Command-line flags take precedence over these.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    #[serde(default = "default_patterns_path")]
    pub patterns_path: PathBuf,
    #[serde(default = "default_summary_path")]
    pub summary_path: PathBuf,
    #[serde(default)]
    pub rotation_path: Option<PathBuf>,
    #[serde(default)]
    pub holidays_path: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_start")]
    pub default_start: String,
    #[serde(default = "default_end")]
    pub default_end: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(ENV_PREFIX).from_iter::<_, AppConfig>(vars)?)
    }

    /// The delimiter must be a single ASCII character.
    pub fn delimiter_byte(&self) -> Result<u8, AppError> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(AppError::InvalidDelimiter(self.delimiter.clone())),
        }
    }
}
