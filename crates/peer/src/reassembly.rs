//! Empfangsseitiges Zusammensetzen von Dateien
//!
//! Chunks werden nach `chunkIndex` gepuffert. Vollstaendig ist ein Transfer
//! wenn jeder Index `0..chunksCount` vorliegt; `isLastChunk` ist nur ein Hinweis.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use whisperlink_protocol::FileMetadata;

use crate::error::{PeerError, PeerResult};

/// Ein eingehender Transfer
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    metadata: FileMetadata,
    chunks: BTreeMap<u32, Bytes>,
    empfangene_bytes: u64,
}

impl IncomingTransfer {
    pub fn neu(metadata: FileMetadata) -> Self {
        Self {
            metadata,
            chunks: BTreeMap::new(),
            empfangene_bytes: 0,
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Nimmt einen Chunk auf und meldet ob der Transfer nun vollstaendig ist
    pub fn chunk_hinzufuegen(&mut self, chunk_index: u32, data: Bytes) -> PeerResult<bool> {
        if chunk_index >= self.metadata.chunks_count {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Chunk {} ausserhalb von 0..{}",
                chunk_index, self.metadata.chunks_count
            )));
        }
        if self.chunks.contains_key(&chunk_index) {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Chunk {} doppelt empfangen",
                chunk_index
            )));
        }
        let neu_gesamt = self.empfangene_bytes + data.len() as u64;
        if neu_gesamt > self.metadata.file_size {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Mehr Daten als angekuendigt: {} > {} Bytes",
                neu_gesamt, self.metadata.file_size
            )));
        }

        self.empfangene_bytes = neu_gesamt;
        self.chunks.insert(chunk_index, data);
        Ok(self.ist_vollstaendig())
    }

    pub fn empfangene_chunks(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn ist_vollstaendig(&self) -> bool {
        self.empfangene_chunks() == self.metadata.chunks_count
    }

    /// Fortschritt in Prozent (0 Chunks = 100)
    pub fn fortschritt(&self) -> u8 {
        if self.metadata.chunks_count == 0 {
            return 100;
        }
        ((self.empfangene_chunks() as u64 * 100) / self.metadata.chunks_count as u64) as u8
    }

    /// Fehlende Indizes in aufsteigender Reihenfolge
    pub fn fehlende_chunks(&self) -> Vec<u32> {
        (0..self.metadata.chunks_count)
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }

    /// Setzt die Datei in Index-Reihenfolge zusammen
    pub fn zusammensetzen(self) -> PeerResult<Bytes> {
        if !self.ist_vollstaendig() {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Transfer {} unvollstaendig, es fehlen {:?}",
                self.metadata.transfer_id,
                self.fehlende_chunks()
            )));
        }
        if self.empfangene_bytes != self.metadata.file_size {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Groesse passt nicht: {} statt {} Bytes",
                self.empfangene_bytes, self.metadata.file_size
            )));
        }

        let mut datei = BytesMut::with_capacity(self.empfangene_bytes as usize);
        for chunk in self.chunks.into_values() {
            datei.extend_from_slice(&chunk);
        }
        Ok(datei.freeze())
    }
}

/// Transfers die Chunks vor ihren Metadaten haben duerfen
pub const MAX_VORZEITIGE_TRANSFERS: usize = 32;

/// Chunks pro Transfer die vor den Metadaten gepuffert werden
pub const MAX_VORZEITIGE_CHUNKS: usize = 64;

/// Puffer fuer alle eingehenden Transfers eines Peers
///
/// Der Transport garantiert keine Reihenfolge: Chunks die vor ihrem
/// `file-metadata` eintreffen werden begrenzt zwischengespeichert.
#[derive(Debug, Default)]
pub struct EmpfangsPuffer {
    transfers: DashMap<String, IncomingTransfer>,
    vorzeitig: DashMap<String, Vec<(u32, Bytes)>>,
}

impl EmpfangsPuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legt einen Transfer an; eine leere Datei ist sofort fertig
    ///
    /// Bereits gepufferte Chunks werden uebernommen, der Transfer kann
    /// dadurch sofort vollstaendig sein.
    pub fn metadata_empfangen(&self, metadata: FileMetadata) -> Option<(FileMetadata, Bytes)> {
        let transfer_id = metadata.transfer_id.clone();
        if metadata.chunks_count == 0 {
            self.vorzeitig.remove(&transfer_id);
            tracing::info!(transfer_id = %transfer_id, "Leere Datei empfangen");
            return Some((metadata, Bytes::new()));
        }
        tracing::debug!(
            transfer_id = %transfer_id,
            datei = %metadata.file_name,
            chunks = metadata.chunks_count,
            "Eingehender Transfer angelegt"
        );
        self.transfers
            .insert(transfer_id.clone(), IncomingTransfer::neu(metadata));
        self.nachholen(&transfer_id)
    }

    /// Nimmt einen Chunk auf; liefert die fertige Datei sobald alle Chunks da sind
    ///
    /// Ohne Metadaten wird der Chunk gepuffert und `Ok(None)` geliefert.
    pub fn chunk_empfangen(
        &self,
        transfer_id: &str,
        chunk_index: u32,
        data: Bytes,
    ) -> PeerResult<Option<(FileMetadata, Bytes)>> {
        let vollstaendig = match self.transfers.get_mut(transfer_id) {
            Some(mut transfer) => transfer.chunk_hinzufuegen(chunk_index, data)?,
            None => {
                self.parken(transfer_id, chunk_index, data)?;
                // Metadaten koennen inzwischen eingetroffen sein
                return Ok(self.nachholen(transfer_id));
            }
        };

        if !vollstaendig {
            return Ok(None);
        }
        self.abschliessen(transfer_id)
    }

    fn parken(&self, transfer_id: &str, chunk_index: u32, data: Bytes) -> PeerResult<()> {
        if !self.vorzeitig.contains_key(transfer_id)
            && self.vorzeitig.len() >= MAX_VORZEITIGE_TRANSFERS
        {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Zu viele Transfers ohne Metadaten, Chunk {} von {} verworfen",
                chunk_index, transfer_id
            )));
        }
        let mut wartend = self.vorzeitig.entry(transfer_id.to_string()).or_default();
        if wartend.len() >= MAX_VORZEITIGE_CHUNKS {
            return Err(PeerError::UngueltigeEingabe(format!(
                "Zu viele Chunks ohne Metadaten fuer {}",
                transfer_id
            )));
        }
        wartend.push((chunk_index, data));
        tracing::debug!(
            transfer_id,
            chunk_index,
            wartend = wartend.len(),
            "Chunk vor Metadaten gepuffert"
        );
        Ok(())
    }

    /// Uebernimmt gepufferte Chunks in einen angelegten Transfer
    fn nachholen(&self, transfer_id: &str) -> Option<(FileMetadata, Bytes)> {
        if !self.transfers.contains_key(transfer_id) {
            return None;
        }
        let (_, wartend) = self.vorzeitig.remove(transfer_id)?;

        let vollstaendig = {
            let mut transfer = self.transfers.get_mut(transfer_id)?;
            for (chunk_index, data) in wartend {
                if let Err(e) = transfer.chunk_hinzufuegen(chunk_index, data) {
                    tracing::warn!(transfer_id, chunk_index, fehler = %e, "Gepufferter Chunk verworfen");
                }
            }
            transfer.ist_vollstaendig()
        };

        if !vollstaendig {
            return None;
        }
        match self.abschliessen(transfer_id) {
            Ok(fertig) => fertig,
            Err(e) => {
                tracing::warn!(transfer_id, fehler = %e, "Transfer nicht zusammensetzbar");
                None
            }
        }
    }

    fn abschliessen(&self, transfer_id: &str) -> PeerResult<Option<(FileMetadata, Bytes)>> {
        let Some((_, transfer)) = self.transfers.remove(transfer_id) else {
            return Ok(None);
        };
        let metadata = transfer.metadata().clone();
        let datei = transfer.zusammensetzen()?;
        tracing::info!(
            transfer_id = %transfer_id,
            bytes = datei.len(),
            "Eingehender Transfer vollstaendig"
        );
        Ok(Some((metadata, datei)))
    }

    pub fn transfer(&self, transfer_id: &str) -> Option<IncomingTransfer> {
        self.transfers.get(transfer_id).map(|t| t.value().clone())
    }

    pub fn laufende_transfers(&self) -> usize {
        self.transfers.len()
    }

    /// Anzahl Transfers mit Chunks aber ohne Metadaten
    pub fn wartende_transfers(&self) -> usize {
        self.vorzeitig.len()
    }

    pub fn verwerfen(&self, transfer_id: &str) -> bool {
        let vorzeitig = self.vorzeitig.remove(transfer_id).is_some();
        self.transfers.remove(transfer_id).is_some() || vorzeitig
    }
}
