//! # whisperlink-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON),
//! gesteuert ueber Konfiguration und `WL_LOG_*` Umgebungsvariablen.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat, LoggingError};
