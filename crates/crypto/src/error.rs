//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Kryptografie nicht verfuegbar: {0}")]
    KryptoNichtVerfuegbar(String),

    #[error("Ungueltige Schluessel-Kodierung: {0}")]
    UngueltigeSchluesselKodierung(String),

    #[error("Session nicht initialisiert")]
    NichtInitialisiert,

    #[error("Handshake nicht abgeschlossen")]
    HandshakeUnvollstaendig,

    #[error("Key-Exchange fehlgeschlagen: {0}")]
    KeyExchange(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Ungueltiger Umschlag: {0}")]
    UngueltigerUmschlag(String),

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Kein Schluessel fuer Gruppe {group_id}")]
    KeinSchluessel { group_id: String },

    #[error("Schluessel-Version passt nicht: erwartet {erwartet}, erhalten {erhalten}")]
    VersionMismatch { erwartet: u32, erhalten: u32 },

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
