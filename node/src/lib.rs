//! whisperlink-node – Bibliotheks-Root
//!
//! Deklariert die Knoten-Module und stellt den Einstiegspunkt fuer Tests
//! bereit.

pub mod config;
pub mod loopback;
pub mod persistence;

use std::sync::Arc;

use anyhow::Result;
use config::NodeConfig;
use loopback::SelbsttestBericht;
use persistence::JsonDateiPersistenz;
use whisperlink_core::{MemoryPersistence, Persistence};
use whisperlink_peer::OutgoingFile;

/// Groesse der Beispieldatei wenn keine Datei angegeben wurde
const BEISPIEL_GROESSE: usize = 40 * 1024;

/// Haelt den Knoten-Zustand zusammen
pub struct Node {
    pub config: NodeConfig,
}

impl Node {
    /// Erstellt einen neuen Knoten aus der gegebenen Konfiguration
    pub fn neu(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Oeffnet den konfigurierten Speicher
    ///
    /// Ohne `storage.pfad` bleibt alles im Arbeitsspeicher.
    pub fn persistenz_oeffnen(&self) -> Result<Arc<dyn Persistence>> {
        Ok(match &self.config.storage.pfad {
            Some(pfad) if !pfad.trim().is_empty() => {
                tracing::info!(pfad = %pfad, "Persistenz: JSON-Datei");
                Arc::new(JsonDateiPersistenz::oeffnen(pfad)?)
            }
            _ => {
                tracing::info!("Persistenz: nur im Arbeitsspeicher");
                Arc::new(MemoryPersistence::new())
            }
        })
    }

    /// Laedt die Datei von `pfad` oder erzeugt eine Beispieldatei
    pub async fn datei_vorbereiten(pfad: Option<&str>) -> Result<OutgoingFile> {
        match pfad {
            Some(pfad) => Ok(OutgoingFile::aus_pfad(pfad).await?),
            None => {
                let data: Vec<u8> = (0..BEISPIEL_GROESSE).map(|i| (i % 251) as u8).collect();
                Ok(OutgoingFile::neu("beispiel.bin", "application/octet-stream", data))
            }
        }
    }

    /// Fuehrt den Loopback-Selbsttest aus
    ///
    /// Reihenfolge:
    /// 1. Persistenz oeffnen
    /// 2. Handshake und verschluesselte Nachricht
    /// 3. Dateitransfer (verschluesselt und unverschluesselt)
    /// 4. Gruppe mit Einladung und Schluesselverteilung
    pub async fn starten(self, datei: OutgoingFile) -> Result<SelbsttestBericht> {
        tracing::info!(
            peer = %self.config.peer.id,
            datei = %datei.name,
            bytes = datei.groesse(),
            chunk_size = self.config.transfer.chunk_size,
            "Knoten startet Selbsttest"
        );

        let persistence = self.persistenz_oeffnen()?;
        let bericht = loopback::selbsttest(&self.config, persistence, datei).await?;

        tracing::info!(
            dateien = bericht.dateien.len(),
            mitglieder = bericht.gruppen_mitglieder,
            key_version = bericht.gruppenschluessel_version,
            "Selbsttest erfolgreich"
        );
        Ok(bericht)
    }
}
