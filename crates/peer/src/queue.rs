//! ConnectionQueue – Sende-Warteschlange pro Verbindung
//!
//! Solange der Kanal nicht offen ist werden Nachrichten gepuffert und beim
//! naechsten `open` in FIFO-Reihenfolge gesendet. Gleichzeitige neue
//! Sendungen waehrend des Leerens sind nicht streng geordnet.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use whisperlink_core::{CoreError, Payload, Transport, TransportEvent};
use whisperlink_protocol::PeerFrame;

use crate::error::PeerResult;

/// Ergebnis von `send_message_safely`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Queued,
}

/// Warteschlange fuer genau eine Verbindung
pub struct ConnectionQueue {
    transport: Arc<dyn Transport>,
    ausstehend: Mutex<VecDeque<Payload>>,
}

impl std::fmt::Debug for ConnectionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionQueue")
            .field("peer", &self.transport.remote_peer_id())
            .field("ausstehend", &self.pending_count())
            .finish()
    }
}

impl ConnectionQueue {
    pub fn neu(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            ausstehend: Mutex::new(VecDeque::new()),
        })
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn peer_id(&self) -> &str {
        self.transport.remote_peer_id()
    }

    /// Sendet sofort wenn offen, sonst wird gepuffert
    ///
    /// Puffern ist kein Fehler. Schliesst sich der Kanal zwischen Pruefung
    /// und Senden, wird die Nachricht ebenfalls gepuffert.
    pub async fn send_message_safely(&self, payload: Payload) -> PeerResult<SendOutcome> {
        if !self.transport.ist_offen() {
            self.einreihen(payload);
            return Ok(SendOutcome::Queued);
        }

        match self.transport.send(payload.clone()).await {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(CoreError::TransportNichtOffen(_)) => {
                self.einreihen(payload);
                Ok(SendOutcome::Queued)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Serialisiert einen Frame und sendet ihn ueber `send_message_safely`
    pub async fn send_frame(&self, frame: &PeerFrame) -> PeerResult<SendOutcome> {
        self.send_message_safely(frame.to_payload()?).await
    }

    fn einreihen(&self, payload: Payload) {
        let mut ausstehend = self.ausstehend.lock();
        ausstehend.push_back(payload);
        tracing::debug!(
            peer = %self.transport.remote_peer_id(),
            ausstehend = ausstehend.len(),
            "Nachricht gepuffert"
        );
    }

    /// Leert die Warteschlange in FIFO-Reihenfolge
    ///
    /// Fehlgeschlagene Nachrichten kommen wieder hinten in die Schlange.
    /// Liefert die Anzahl erfolgreich gesendeter Nachrichten.
    pub async fn flush_on_open(&self) -> usize {
        let batch = std::mem::take(&mut *self.ausstehend.lock());
        if batch.is_empty() {
            return 0;
        }

        let gesamt = batch.len();
        let mut gesendet = 0;
        let mut fehlgeschlagen = Vec::new();
        for payload in batch {
            match self.transport.send(payload.clone()).await {
                Ok(()) => gesendet += 1,
                Err(e) => {
                    tracing::warn!(
                        peer = %self.transport.remote_peer_id(),
                        fehler = %e,
                        "Gepufferte Nachricht nicht gesendet, erneut eingereiht"
                    );
                    fehlgeschlagen.push(payload);
                }
            }
        }

        if !fehlgeschlagen.is_empty() {
            self.ausstehend.lock().extend(fehlgeschlagen);
        }

        tracing::info!(
            peer = %self.transport.remote_peer_id(),
            gesendet,
            gesamt,
            "Warteschlange geleert"
        );
        gesendet
    }

    pub fn pending_count(&self) -> usize {
        self.ausstehend.lock().len()
    }

    /// Startet einen Task der bei jedem `open` die Warteschlange leert
    ///
    /// Der Task endet wenn der Transport seinen Ereignis-Kanal schliesst oder
    /// die Warteschlange verworfen wurde. Muss innerhalb einer Tokio-Runtime
    /// aufgerufen werden.
    pub fn spawn_flush_on_open(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.transport.subscribe();
        let queue: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TransportEvent::Open) => {
                        let Some(queue) = queue.upgrade() else {
                            break;
                        };
                        queue.flush_on_open().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(verpasst = n, "Transport-Ereignisse uebersprungen");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
