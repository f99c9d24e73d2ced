//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfiguration):
//! - `WL_LOG_LEVEL`: Filter-Direktive (z.B. `info`, `whisperlink_peer=debug`), Standard: info
//! - `WL_LOG_FORMAT`: Format (text/json), Standard: text

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "WL_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "WL_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unbekanntes Log-Format: {0} (erlaubt: text, json)")]
    UnbekanntesFormat(String),

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            andere => Err(LoggingError::UnbekanntesFormat(andere.to_string())),
        }
    }
}

/// Initialisiert das Logging-System
///
/// `WL_LOG_LEVEL` und `WL_LOG_FORMAT` haben Vorrang vor den Parametern.
/// Ein ungueltiger Filter faellt auf `info` zurueck, ein ungueltiges
/// Format ist ein Fehler.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<LogFormat, LoggingError> {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_aufloesen(std::env::var(ENV_LOG_FORMAT).ok(), format)?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| LoggingError::BereitsInitialisiert(e.to_string()))?;

    Ok(format)
}

/// Umgebung vor Konfiguration; leere Werte zaehlen als nicht gesetzt
fn format_aufloesen(aus_env: Option<String>, aus_config: &str) -> Result<LogFormat, LoggingError> {
    aus_env
        .filter(|f| !f.trim().is_empty())
        .as_deref()
        .unwrap_or(aus_config)
        .trim()
        .parse()
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}
