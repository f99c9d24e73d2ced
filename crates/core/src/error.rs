//! Fehlertypen fuer Transport und Persistenz
//!
//! Hoehere Crates wrappen `CoreError` via `#[from]`.

use thiserror::Error;

/// Result-Alias fuer das Core-Crate
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Fehler an den Schnittstellen zu Transport und Persistenz
#[derive(Debug, Error)]
pub enum CoreError {
    // --- Transport ---
    #[error("Transport nicht offen (Status: {0})")]
    TransportNichtOffen(String),

    #[error("Senden fehlgeschlagen: {0}")]
    Senden(String),

    #[error("Verbindung zu Peer {peer_id} fehlgeschlagen: {grund}")]
    Verbindung { peer_id: String, grund: String },

    // --- Persistenz ---
    #[error("Persistenz-Fehler: {0}")]
    Persistenz(String),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CoreError {
    /// Gibt true zurueck wenn der Fehler nur am Verbindungszustand liegt
    pub fn ist_verbindungsfehler(&self) -> bool {
        matches!(
            self,
            Self::TransportNichtOffen(_) | Self::Senden(_) | Self::Verbindung { .. }
        )
    }
}
