//! Loopback-Selbsttest
//!
//! Zwei Peers im selben Prozess, verbunden ueber `MemoryTransport`:
//! Handshake, verschluesselte Nachricht, Dateitransfer (verschluesselt und
//! als Binaer-Frame) und eine Gruppeneinladung mit Schluesselverteilung.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use whisperlink_core::{
    CoreError, CoreResult, MemoryPersistence, MemoryTransport, PeerConnector, Persistence,
    Transport, TransportEvent,
};
use whisperlink_crypto::{EncryptionSession, SecretBytes};
use whisperlink_peer::{
    EmpfangsPuffer, GroupKeyCoordinator, GroupStore, InboundHandler, NullBeobachter, OutgoingFile,
    TransferEngine,
};
use whisperlink_protocol::{FileMetadata, GroupSettings, GroupType, PeerFrame};

use crate::config::NodeConfig;

/// Peer-ID der simulierten Gegenstelle
pub const GEGENSTELLE: &str = "loopback-gegenstelle";

/// Ergebnis des Selbsttests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelbsttestBericht {
    pub nachricht: String,
    /// (verschluesselt, empfangene Bytes)
    pub dateien: Vec<(bool, usize)>,
    pub gruppen_mitglieder: usize,
    pub gruppenschluessel_version: u32,
}

/// Sammelt alles was bei einem Peer ankommt
#[derive(Default)]
struct Sammler {
    nachrichten: Mutex<Vec<String>>,
    schluessel: Mutex<Vec<String>>,
    gruppen_frames: Mutex<Vec<PeerFrame>>,
    puffer: EmpfangsPuffer,
    dateien: Mutex<Vec<(FileMetadata, Bytes)>>,
}

impl Sammler {
    fn fertige_datei(&self, ergebnis: Option<(FileMetadata, Bytes)>) {
        if let Some(datei) = ergebnis {
            self.dateien.lock().push(datei);
        }
    }
}

#[async_trait]
impl InboundHandler for Sammler {
    async fn on_message(&self, text: String) {
        self.nachrichten.lock().push(text);
    }

    async fn on_key_exchange(&self, public_key: String) {
        self.schluessel.lock().push(public_key);
    }

    async fn on_file_metadata(&self, metadata: FileMetadata) {
        let fertig = self.puffer.metadata_empfangen(metadata);
        self.fertige_datei(fertig);
    }

    async fn on_file_chunk(&self, transfer_id: &str, chunk_index: u32, data: Bytes) {
        match self.puffer.chunk_empfangen(transfer_id, chunk_index, data) {
            Ok(fertig) => self.fertige_datei(fertig),
            Err(e) => tracing::warn!(transfer_id, fehler = %e, "Chunk verworfen"),
        }
    }

    async fn on_group_frame(&self, frame: PeerFrame) {
        self.gruppen_frames.lock().push(frame);
    }
}

/// Liefert feste In-Memory-Endpunkte aus
struct LoopbackConnector {
    endpunkte: HashMap<String, Arc<MemoryTransport>>,
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn connect(&self, peer_id: &str) -> CoreResult<Arc<dyn Transport>> {
        match self.endpunkte.get(peer_id) {
            Some(t) => Ok(Arc::clone(t) as Arc<dyn Transport>),
            None => Err(CoreError::Verbindung {
                peer_id: peer_id.to_string(),
                grund: "Peer im Loopback unbekannt".into(),
            }),
        }
    }
}

/// Eine Seite des Loopbacks
struct Seite {
    transport: Arc<MemoryTransport>,
    eingang: broadcast::Receiver<TransportEvent>,
    session: EncryptionSession,
    sammler: Sammler,
}

impl Seite {
    fn neu(transport: Arc<MemoryTransport>) -> Self {
        Self {
            eingang: transport.subscribe(),
            transport,
            session: EncryptionSession::new(),
            sammler: Sammler::default(),
        }
    }

    /// Verarbeitet alle wartenden Nachrichten
    async fn empfangen(&mut self, engine: &TransferEngine) {
        let key = self.session.shared_key().ok().cloned();
        while let Ok(event) = self.eingang.try_recv() {
            if let TransportEvent::Data(payload) = event {
                engine
                    .handle_received_data(&payload, key.as_ref(), &self.sammler)
                    .await;
            }
        }
    }

    async fn gruppen_frames_weitergeben(&self, coordinator: &GroupKeyCoordinator) -> anyhow::Result<()> {
        let frames = std::mem::take(&mut *self.sammler.gruppen_frames.lock());
        for frame in frames {
            coordinator
                .handle_group_frame(self.transport.clone(), frame)
                .await?;
        }
        Ok(())
    }
}

/// Fuehrt den Selbsttest aus
///
/// `persistence` gehoert dem lokalen Peer; die Gegenstelle nutzt
/// fluechtigen Speicher.
pub async fn selbsttest(
    config: &NodeConfig,
    persistence: Arc<dyn Persistence>,
    datei: OutgoingFile,
) -> anyhow::Result<SelbsttestBericht> {
    let lokal_id = config.peer.id.as_str();
    let engine = TransferEngine::neu(config.transfer_config()?);
    let (lokal_t, fern_t) = MemoryTransport::paar(lokal_id, GEGENSTELLE);
    let mut lokal = Seite::neu(lokal_t.clone());
    let mut fern = Seite::neu(fern_t.clone());

    // 1. Handshake
    let lokal_pub = lokal.session.initialize()?;
    let fern_pub = fern.session.initialize()?;
    lokal
        .transport
        .send(EncryptionSession::create_key_exchange_message(&lokal_pub).to_payload()?)
        .await?;
    fern.transport
        .send(EncryptionSession::create_key_exchange_message(&fern_pub).to_payload()?)
        .await?;
    lokal.empfangen(&engine).await;
    fern.empfangen(&engine).await;

    let vom_fernen = lokal.sammler.schluessel.lock().pop();
    let vom_lokalen = fern.sammler.schluessel.lock().pop();
    let (Some(vom_fernen), Some(vom_lokalen)) = (vom_fernen, vom_lokalen) else {
        anyhow::bail!("Schluesselaustausch unvollstaendig");
    };
    lokal.session.process_remote_public_key(&vom_fernen)?;
    fern.session.process_remote_public_key(&vom_lokalen)?;
    tracing::info!("Selbsttest: Handshake abgeschlossen");

    // 2. Verschluesselte Nachricht
    let envelope = lokal.session.encrypt_message("Hallo aus dem Loopback")?;
    lokal.transport.send(PeerFrame::from(envelope).to_payload()?).await?;
    fern.empfangen(&engine).await;
    let nachricht = fern
        .sammler
        .nachrichten
        .lock()
        .pop()
        .ok_or_else(|| anyhow::anyhow!("Nachricht nicht angekommen"))?;
    tracing::info!(nachricht = %nachricht, "Selbsttest: Nachricht empfangen");

    // 3. Dateitransfer verschluesselt und als Binaer-Frame
    let session_key: SecretBytes = lokal.session.shared_key()?.clone();
    let mut dateien = Vec::new();
    for key in [Some(&session_key), None] {
        engine
            .send_file(lokal.transport.as_ref(), &datei, key, &NullBeobachter)
            .await?;
        fern.empfangen(&engine).await;

        let (meta, inhalt) = fern
            .sammler
            .dateien
            .lock()
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Datei nicht vollstaendig angekommen"))?;
        if inhalt != datei.data {
            anyhow::bail!("Datei {} beschaedigt", meta.file_name);
        }
        tracing::info!(
            datei = %meta.file_name,
            bytes = inhalt.len(),
            verschluesselt = key.is_some(),
            "Selbsttest: Datei empfangen"
        );
        dateien.push((key.is_some(), inhalt.len()));
    }

    // 4. Gruppe anlegen, einladen, Schluessel ueber die Sitzung verteilen
    let lokal_gruppen = GroupKeyCoordinator::neu(
        lokal_id,
        config.peer.anzeigename.as_str(),
        Arc::new(LoopbackConnector {
            endpunkte: HashMap::from([(GEGENSTELLE.to_string(), lokal_t.clone())]),
        }),
        GroupStore::laden(persistence, &config.storage.namespace)?,
    );
    let fern_gruppen = GroupKeyCoordinator::neu(
        GEGENSTELLE,
        "Gegenstelle",
        Arc::new(LoopbackConnector {
            endpunkte: HashMap::from([(lokal_id.to_string(), fern_t.clone())]),
        }),
        GroupStore::laden(Arc::new(MemoryPersistence::new()), &config.storage.namespace)?,
    );

    lokal_gruppen.register_session_key(GEGENSTELLE, session_key.clone());
    fern_gruppen.register_session_key(lokal_id, fern.session.shared_key()?.clone());

    let group = lokal_gruppen.create_group("Loopback", GroupType::Small, GroupSettings::default())?;
    lokal_gruppen
        .invite_member_to_group(&group.id, GEGENSTELLE)
        .await?;
    fern.empfangen(&engine).await;
    fern.gruppen_frames_weitergeben(&fern_gruppen).await?;

    fern_gruppen.accept_group_invite(&group.id).await?;
    lokal.empfangen(&engine).await;
    lokal.gruppen_frames_weitergeben(&lokal_gruppen).await?;

    fern.empfangen(&engine).await;
    fern.gruppen_frames_weitergeben(&fern_gruppen).await?;

    let bei_fern = fern_gruppen
        .group(&group.id)
        .ok_or_else(|| anyhow::anyhow!("Gegenstelle kennt die Gruppe nicht"))?;
    let (Some(lokal_key), Some(fern_key)) =
        (lokal_gruppen.group_key(&group.id), fern_gruppen.group_key(&group.id))
    else {
        anyhow::bail!("Gruppenschluessel fehlt");
    };
    if lokal_key.key != fern_key.key {
        anyhow::bail!("Gruppenschluessel stimmen nicht ueberein");
    }
    let im_klartext = lokal_t
        .gesendet()
        .iter()
        .filter_map(|p| p.als_text())
        .any(|t| t.contains(&lokal_key.key_base64));
    if im_klartext {
        anyhow::bail!("Gruppenschluessel im Klartext gesendet");
    }
    tracing::info!(
        group_id = %group.id,
        mitglieder = bei_fern.members.len(),
        "Selbsttest: Gruppe eingerichtet"
    );

    Ok(SelbsttestBericht {
        nachricht,
        dateien,
        gruppen_mitglieder: bei_fern.members.len(),
        gruppenschluessel_version: fern_key.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn selbsttest_laeuft_durch() {
        let config = NodeConfig::default();
        let datei = OutgoingFile::neu(
            "muster.bin",
            "application/octet-stream",
            (0..40_000u32).map(|i| i as u8).collect::<Vec<u8>>(),
        );
        let persistence = Arc::new(MemoryPersistence::new());

        let bericht = selbsttest(&config, persistence.clone(), datei).await.unwrap();
        assert_eq!(bericht.nachricht, "Hallo aus dem Loopback");
        assert_eq!(bericht.dateien, vec![(true, 40_000), (false, 40_000)]);
        assert_eq!(bericht.gruppen_mitglieder, 2);
        assert_eq!(bericht.gruppenschluessel_version, 1);
        assert!(persistence.get_item("whisperlink_groups").unwrap().is_some());
    }
}
