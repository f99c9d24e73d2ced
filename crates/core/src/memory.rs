//! In-Memory-Transport
//!
//! Zwei verbundene Endpunkte im selben Prozess. Jeder Endpunkt zeichnet
//! gesendete Nachrichten auf und liefert sie der Gegenstelle als
//! `TransportEvent::Data`. Fuer Tests und den Loopback-Selbsttest.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::{CoreError, CoreResult};
use crate::event::TransportEvent;
use crate::transport::Transport;
use crate::types::{ConnectionStatus, Payload};

/// Kapazitaet des Ereignis-Kanals pro Endpunkt
const EVENT_KAPAZITAET: usize = 4096;

/// Ein Endpunkt einer In-Memory-Verbindung
pub struct MemoryTransport {
    remote_peer_id: String,
    status: Mutex<ConnectionStatus>,
    events: broadcast::Sender<TransportEvent>,
    gegenstelle: Mutex<Weak<MemoryTransport>>,
    gesendet: Mutex<Vec<Payload>>,
    /// Anzahl der naechsten Sendevorgaenge die fehlschlagen sollen
    sendefehler: Mutex<usize>,
}

impl MemoryTransport {
    fn neu(remote_peer_id: &str, status: ConnectionStatus) -> Self {
        let (events, _) = broadcast::channel(EVENT_KAPAZITAET);
        Self {
            remote_peer_id: remote_peer_id.to_string(),
            status: Mutex::new(status),
            events,
            gegenstelle: Mutex::new(Weak::new()),
            gesendet: Mutex::new(Vec::new()),
            sendefehler: Mutex::new(0),
        }
    }

    /// Erstellt ein verbundenes Paar
    ///
    /// Der erste Endpunkt gehoert zu `peer_a` und spricht mit `peer_b`,
    /// der zweite umgekehrt.
    pub fn paar(peer_a: &str, peer_b: &str) -> (Arc<Self>, Arc<Self>) {
        let a = Arc::new(Self::neu(peer_b, ConnectionStatus::Connected));
        let b = Arc::new(Self::neu(peer_a, ConnectionStatus::Connected));
        *a.gegenstelle.lock() = Arc::downgrade(&b);
        *b.gegenstelle.lock() = Arc::downgrade(&a);
        (a, b)
    }

    /// Einzelner Endpunkt ohne Gegenstelle (Nachrichten werden nur aufgezeichnet)
    pub fn einzeln(remote_peer_id: &str, status: ConnectionStatus) -> Arc<Self> {
        Arc::new(Self::neu(remote_peer_id, status))
    }

    /// Setzt den Status und meldet `open`/`close` an die Abonnenten
    pub fn status_setzen(&self, status: ConnectionStatus) {
        let vorher = std::mem::replace(&mut *self.status.lock(), status);
        if vorher == status {
            return;
        }
        tracing::debug!(
            peer = %self.remote_peer_id,
            von = %vorher,
            nach = %status,
            "Verbindungsstatus geaendert"
        );
        let event = match status {
            ConnectionStatus::Connected => TransportEvent::Open,
            ConnectionStatus::Disconnected => TransportEvent::Close,
            ConnectionStatus::Connecting => return,
        };
        // Keine Abonnenten ist kein Fehler
        let _ = self.events.send(event);
    }

    /// Laesst die naechsten `anzahl` Sendevorgaenge fehlschlagen
    pub fn sendefehler_simulieren(&self, anzahl: usize) {
        *self.sendefehler.lock() = anzahl;
    }

    /// Alle bisher gesendeten Nachrichten in Sende-Reihenfolge
    pub fn gesendet(&self) -> Vec<Payload> {
        self.gesendet.lock().clone()
    }

    /// Alle gesendeten Text-Nachrichten als JSON
    pub fn gesendet_json(&self) -> Vec<serde_json::Value> {
        self.gesendet
            .lock()
            .iter()
            .filter_map(|p| p.als_text())
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    /// Stellt eine Nachricht zu als kaeme sie von der Gegenstelle
    pub fn zustellen(&self, payload: Payload) {
        let _ = self.events.send(TransportEvent::Data(payload));
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: Payload) -> CoreResult<()> {
        let status = *self.status.lock();
        if !status.ist_offen() {
            tracing::debug!(peer = %self.remote_peer_id, %status, "Senden auf nicht offenem Kanal");
            return Err(CoreError::TransportNichtOffen(status.to_string()));
        }

        {
            let mut fehler = self.sendefehler.lock();
            if *fehler > 0 {
                *fehler -= 1;
                tracing::warn!(peer = %self.remote_peer_id, "Simulierter Sendefehler");
                return Err(CoreError::Senden("simulierter Sendefehler".into()));
            }
        }

        self.gesendet.lock().push(payload.clone());
        let gegenstelle = self.gegenstelle.lock().upgrade();
        if let Some(gegenstelle) = gegenstelle {
            gegenstelle.zustellen(payload);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock()
    }

    fn remote_peer_id(&self) -> &str {
        &self.remote_peer_id
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("remote_peer_id", &self.remote_peer_id)
            .field("status", &*self.status.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paar_liefert_nachrichten_an_gegenstelle() {
        let (a, b) = MemoryTransport::paar("alice", "bob");
        let mut rx = b.subscribe();

        a.send(Payload::from("hallo")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Data(Payload::from("hallo")));
        assert_eq!(a.gesendet(), vec![Payload::from("hallo")]);
        assert_eq!(a.remote_peer_id(), "bob");
        assert_eq!(b.remote_peer_id(), "alice");
    }

    #[tokio::test]
    async fn senden_auf_geschlossenem_kanal_schlaegt_fehl() {
        let t = MemoryTransport::einzeln("bob", ConnectionStatus::Connecting);
        let result = t.send(Payload::from("x")).await;
        assert!(matches!(result, Err(CoreError::TransportNichtOffen(_))));
        assert!(t.gesendet().is_empty());
    }

    #[tokio::test]
    async fn status_wechsel_meldet_open_und_close() {
        let t = MemoryTransport::einzeln("bob", ConnectionStatus::Connecting);
        let mut rx = t.subscribe();

        t.status_setzen(ConnectionStatus::Connected);
        t.status_setzen(ConnectionStatus::Disconnected);

        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Open);
        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Close);
    }

    #[tokio::test]
    async fn simulierte_sendefehler() {
        let t = MemoryTransport::einzeln("bob", ConnectionStatus::Connected);
        t.sendefehler_simulieren(1);

        assert!(t.send(Payload::from("1")).await.is_err());
        assert!(t.send(Payload::from("2")).await.is_ok());
        assert_eq!(t.gesendet(), vec![Payload::from("2")]);
    }
}
