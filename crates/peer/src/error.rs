//! Fehlertypen fuer das Peer-Crate

use thiserror::Error;
use whisperlink_core::CoreError;
use whisperlink_crypto::CryptoError;

/// Peer-Fehlertypen
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Gruppe nicht gefunden: {0}")]
    GruppeNichtGefunden(String),

    #[error("Keine Berechtigung: {0}")]
    KeineBerechtigung(String),

    #[error("Peer {peer_id} ist bereits Mitglied von {group_id}")]
    BereitsMitglied { group_id: String, peer_id: String },

    #[error("Einladung nicht gefunden: {0}")]
    EinladungNichtGefunden(String),

    #[error("Keine 1:1-Sitzung mit {0}")]
    KeineSitzung(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Transfer-IO-Fehler: {0}")]
    TransferIo(#[from] std::io::Error),

    #[error("Transport nicht offen: {0}")]
    TransportNichtOffen(String),

    #[error("Transport-Fehler: {0}")]
    Core(CoreError),

    #[error("Kryptografie-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<CoreError> for PeerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TransportNichtOffen(status) => PeerError::TransportNichtOffen(status),
            andere => PeerError::Core(andere),
        }
    }
}

pub type PeerResult<T> = Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_nicht_offen_wird_abgebildet() {
        let err: PeerError = CoreError::TransportNichtOffen("connecting".into()).into();
        assert!(matches!(err, PeerError::TransportNichtOffen(s) if s == "connecting"));

        let err: PeerError = CoreError::Senden("kaputt".into()).into();
        assert!(matches!(err, PeerError::Core(_)));
    }
}
