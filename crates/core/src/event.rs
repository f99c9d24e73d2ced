//! Transport-Ereignisse
//!
//! Entspricht dem `on(event, handler)`-Teil des Transport-Vertrags:
//! Abonnenten erhalten `open`, `data`, `close` und `error` ueber einen
//! tokio-Broadcast-Kanal. Das Droppen des Empfaengers ist das Abmelden.

use crate::types::Payload;

/// Alle Ereignisse die ein Transport meldet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Kanal ist offen, ausstehende Nachrichten koennen gesendet werden
    Open,
    /// Eine ganze Nachricht ist eingetroffen
    Data(Payload),
    /// Kanal wurde geschlossen
    Close,
    /// Transport-Fehler (nicht fatal fuer andere Verbindungen)
    Error(String),
}

impl TransportEvent {
    /// Name des Ereignisses wie im Transport-Vertrag
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Open => "open",
            TransportEvent::Data(_) => "data",
            TransportEvent::Close => "close",
            TransportEvent::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ereignis_namen() {
        assert_eq!(TransportEvent::Open.name(), "open");
        assert_eq!(TransportEvent::Data(Payload::from("x")).name(), "data");
        assert_eq!(TransportEvent::Close.name(), "close");
        assert_eq!(TransportEvent::Error("x".into()).name(), "error");
    }
}
