//! Transport-Vertrag
//!
//! Die Host-Anwendung liefert das Transport-Objekt (z.B. einen WebRTC
//! DataChannel). Der Protokoll-Layer benutzt nur `send`, `subscribe` (das
//! `on(event, handler)` des Vertrags) und `status`. NAT-Traversal und
//! ICE-Aushandlung liegen ausserhalb.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::CoreResult;
use crate::event::TransportEvent;
use crate::types::{ConnectionStatus, Payload};

/// Eine nachrichtenorientierte Peer-Verbindung
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sendet eine ganze Nachricht
    ///
    /// Liefert `CoreError::TransportNichtOffen` wenn der Kanal nicht offen ist.
    async fn send(&self, payload: Payload) -> CoreResult<()>;

    /// Abonniert alle zukuenftigen Ereignisse (open/data/close/error)
    ///
    /// Das Droppen des Empfaengers meldet das Abonnement ab.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Aktueller Verbindungsstatus
    fn status(&self) -> ConnectionStatus;

    /// ID des Peers auf der anderen Seite
    fn remote_peer_id(&self) -> &str;

    fn ist_offen(&self) -> bool {
        self.status().ist_offen()
    }
}

/// Baut Verbindungen zu anderen Peers auf
///
/// Wird vom Gruppen-Koordinator beim Einladen benutzt. Die Verbindung darf
/// zurueckgegeben werden bevor sie offen ist; ausgehende Nachrichten werden
/// dann gepuffert.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, peer_id: &str) -> CoreResult<Arc<dyn Transport>>;
}
