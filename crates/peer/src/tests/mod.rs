//! Service-Tests fuer das Peer-Crate

mod group_tests;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use whisperlink_core::{CoreError, CoreResult, MemoryTransport, PeerConnector, Transport};
use whisperlink_protocol::{FileMetadata, PeerFrame};

use crate::error::PeerError;
use crate::router::InboundHandler;
use crate::transfer::TransferObserver;

/// Connector mit festen In-Memory-Endpunkten
#[derive(Default)]
pub(crate) struct TestConnector {
    endpunkte: Mutex<HashMap<String, Arc<MemoryTransport>>>,
}

impl TestConnector {
    pub(crate) fn mit(endpunkte: &[(&str, &Arc<MemoryTransport>)]) -> Arc<Self> {
        let connector = Self::default();
        for (peer_id, transport) in endpunkte {
            connector
                .endpunkte
                .lock()
                .insert(peer_id.to_string(), Arc::clone(transport));
        }
        Arc::new(connector)
    }
}

#[async_trait]
impl PeerConnector for TestConnector {
    async fn connect(&self, peer_id: &str) -> CoreResult<Arc<dyn Transport>> {
        let transport = self.endpunkte.lock().get(peer_id).cloned();
        match transport {
            Some(t) => Ok(t),
            None => Err(CoreError::Verbindung {
                peer_id: peer_id.to_string(),
                grund: "kein Endpunkt".into(),
            }),
        }
    }
}

/// Alles was beim Empfang ankommt
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Empfangen {
    Nachricht(String),
    Schluessel(String),
    Metadaten(FileMetadata),
    Chunk(String, u32, Bytes),
    Fertig(String),
    Gruppe(PeerFrame),
    Unbekannt(String, Value),
}

#[derive(Default)]
pub(crate) struct AufzeichnenderHandler {
    pub(crate) ereignisse: Mutex<Vec<Empfangen>>,
}

impl AufzeichnenderHandler {
    pub(crate) fn alle(&self) -> Vec<Empfangen> {
        self.ereignisse.lock().clone()
    }

    fn merken(&self, e: Empfangen) {
        self.ereignisse.lock().push(e);
    }
}

#[async_trait]
impl InboundHandler for AufzeichnenderHandler {
    async fn on_message(&self, text: String) {
        self.merken(Empfangen::Nachricht(text));
    }

    async fn on_key_exchange(&self, public_key: String) {
        self.merken(Empfangen::Schluessel(public_key));
    }

    async fn on_file_metadata(&self, metadata: FileMetadata) {
        self.merken(Empfangen::Metadaten(metadata));
    }

    async fn on_file_chunk(&self, transfer_id: &str, chunk_index: u32, data: Bytes) {
        self.merken(Empfangen::Chunk(transfer_id.to_string(), chunk_index, data));
    }

    async fn on_file_transfer_complete(&self, transfer_id: &str) {
        self.merken(Empfangen::Fertig(transfer_id.to_string()));
    }

    async fn on_group_frame(&self, frame: PeerFrame) {
        self.merken(Empfangen::Gruppe(frame));
    }

    async fn on_unrecognized(&self, typ: &str, raw: &Value) {
        self.merken(Empfangen::Unbekannt(typ.to_string(), raw.clone()));
    }
}

/// Zeichnet Fortschritt, Abschluss und Fehler auf
#[derive(Default)]
pub(crate) struct AufzeichnenderBeobachter {
    pub(crate) fortschritt: Mutex<Vec<u8>>,
    pub(crate) fertig: Mutex<Vec<String>>,
    pub(crate) fehler: Mutex<Vec<(String, String)>>,
}

impl TransferObserver for AufzeichnenderBeobachter {
    fn on_progress(&self, _transfer_id: &str, percent: u8) {
        self.fortschritt.lock().push(percent);
    }

    fn on_complete(&self, transfer_id: &str) {
        self.fertig.lock().push(transfer_id.to_string());
    }

    fn on_error(&self, error: &PeerError, transfer_id: &str) {
        self.fehler
            .lock()
            .push((transfer_id.to_string(), error.to_string()));
    }
}
