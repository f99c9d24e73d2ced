//! TransferEngine – Dateien in Chunks an einen Peer senden
//!
//! ## Ablauf
//! 1. `file-metadata` (bei Verschluesselung als `encrypted-message`)
//! 2. Chunks `0..chunksCount` nacheinander, mit Pause zwischen zwei Chunks
//! 3. `on_complete` nach dem letzten Chunk, Datensatz wird verworfen
//!
//! Jeder Fehler beendet nur diesen Transfer (`on_error`), ohne Wiederholung.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use whisperlink_core::{Payload, Transport};
use whisperlink_crypto::{encrypt_bytes, encrypt_json, SecretBytes};
use whisperlink_protocol::{ChunkFrameCodec, ChunkHeader, FileMetadata, PeerFrame};

use crate::error::{PeerError, PeerResult};
use crate::router::{InboundHandler, MessageRouter};

/// Maximale Chunk-Groesse in Bytes
pub const CHUNK_SIZE: usize = 16384;

/// Standard-Pause zwischen zwei Chunks in Millisekunden
pub const CHUNK_DELAY_MS: u64 = 50;

/// Einstellungen fuer ausgehende Transfers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        }
    }
}

impl TransferConfig {
    /// Prueft `chunk_size` gegen `1..=CHUNK_SIZE`
    pub fn neu(chunk_size: usize, chunk_delay_ms: u64) -> PeerResult<Self> {
        if chunk_size == 0 || chunk_size > CHUNK_SIZE {
            return Err(PeerError::UngueltigeEingabe(format!(
                "chunk_size muss zwischen 1 und {} liegen, ist {}",
                CHUNK_SIZE, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_delay: Duration::from_millis(chunk_delay_ms),
        })
    }

    /// `ceil(groesse / chunk_size)`
    pub fn chunk_anzahl(&self, groesse: usize) -> u32 {
        groesse.div_ceil(self.chunk_size) as u32
    }
}

/// Eine zu sendende Datei, vollstaendig im Speicher
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl OutgoingFile {
    pub fn neu(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Liest eine Datei von der Platte; der MIME-Typ folgt der Endung
    pub async fn aus_pfad(pfad: impl AsRef<Path>) -> PeerResult<Self> {
        let pfad = pfad.as_ref();
        let data = tokio::fs::read(pfad).await?;
        let name = pfad
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PeerError::UngueltigeEingabe(format!("Kein Dateiname in {}", pfad.display()))
            })?;

        Ok(Self {
            mime_type: mime_aus_endung(&name).to_string(),
            name,
            data: Bytes::from(data),
        })
    }

    pub fn groesse(&self) -> usize {
        self.data.len()
    }
}

fn mime_aus_endung(name: &str) -> &'static str {
    let endung = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match endung.as_str() {
        "txt" | "md" | "log" => "text/plain",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// Buchfuehrung eines laufenden ausgehenden Transfers
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub transfer_id: String,
    pub file_name: String,
    pub sent_chunks: u32,
    pub total_chunks: u32,
    pub use_encryption: bool,
    pub started_at: DateTime<Utc>,
}

/// Rueckmeldungen eines ausgehenden Transfers
pub trait TransferObserver: Send + Sync {
    fn on_progress(&self, _transfer_id: &str, _percent: u8) {}
    fn on_complete(&self, _transfer_id: &str) {}
    fn on_error(&self, _error: &PeerError, _transfer_id: &str) {}
}

/// Beobachter der nichts tut
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBeobachter;

impl TransferObserver for NullBeobachter {}

/// Transfer-ID: Zeitstempel (ms) plus Zufallsanteil
pub fn generate_transfer_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut zufall: u64 = rand::random();
    let suffix: String = (0..9)
        .map(|_| {
            let zeichen = ALPHABET[(zufall % 36) as usize] as char;
            zufall /= 36;
            zeichen
        })
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// Sendet und empfaengt Dateien ueber einen Transport
pub struct TransferEngine {
    config: TransferConfig,
    codec: ChunkFrameCodec,
    router: MessageRouter,
    aktiv: DashMap<String, TransferRecord>,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::neu(TransferConfig::default())
    }
}

impl TransferEngine {
    pub fn neu(config: TransferConfig) -> Self {
        let codec = ChunkFrameCodec::new();
        Self {
            config,
            router: MessageRouter::with_codec(codec.clone()),
            codec,
            aktiv: DashMap::new(),
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Anzahl der laufenden ausgehenden Transfers
    pub fn aktive_transfers(&self) -> usize {
        self.aktiv.len()
    }

    pub fn transfer(&self, transfer_id: &str) -> Option<TransferRecord> {
        self.aktiv.get(transfer_id).map(|r| r.value().clone())
    }

    /// Sendet eine Datei vollstaendig an den Peer
    ///
    /// `key` schaltet die Verschluesselung ein. Fehler werden an
    /// `observer.on_error` gemeldet und zusaetzlich zurueckgegeben.
    pub async fn send_file(
        &self,
        transport: &dyn Transport,
        file: &OutgoingFile,
        key: Option<&SecretBytes>,
        observer: &dyn TransferObserver,
    ) -> PeerResult<String> {
        let transfer_id = generate_transfer_id();
        let total_chunks = self.config.chunk_anzahl(file.groesse());

        self.aktiv.insert(
            transfer_id.clone(),
            TransferRecord {
                transfer_id: transfer_id.clone(),
                file_name: file.name.clone(),
                sent_chunks: 0,
                total_chunks,
                use_encryption: key.is_some(),
                started_at: Utc::now(),
            },
        );

        tracing::info!(
            transfer_id = %transfer_id,
            peer = %transport.remote_peer_id(),
            datei = %file.name,
            bytes = file.groesse(),
            chunks = total_chunks,
            verschluesselt = key.is_some(),
            "Dateitransfer gestartet"
        );

        let ergebnis = self
            .stream_senden(transport, file, &transfer_id, total_chunks, key, observer)
            .await;
        self.aktiv.remove(&transfer_id);

        match ergebnis {
            Ok(()) => {
                tracing::info!(transfer_id = %transfer_id, "Dateitransfer abgeschlossen");
                observer.on_complete(&transfer_id);
                Ok(transfer_id)
            }
            Err(e) => {
                tracing::warn!(transfer_id = %transfer_id, fehler = %e, "Dateitransfer abgebrochen");
                observer.on_error(&e, &transfer_id);
                Err(e)
            }
        }
    }

    async fn stream_senden(
        &self,
        transport: &dyn Transport,
        file: &OutgoingFile,
        transfer_id: &str,
        total_chunks: u32,
        key: Option<&SecretBytes>,
        observer: &dyn TransferObserver,
    ) -> PeerResult<()> {
        let metadata = PeerFrame::FileMetadata(FileMetadata {
            transfer_id: transfer_id.to_string(),
            file_name: file.name.clone(),
            file_type: file.mime_type.clone(),
            file_size: file.groesse() as u64,
            chunks_count: total_chunks,
            timestamp: Utc::now().timestamp_millis(),
        });
        let payload = match key {
            Some(key) => PeerFrame::from(encrypt_json(&metadata, key.as_bytes())?).to_payload()?,
            None => metadata.to_payload()?,
        };
        transport.send(payload).await?;

        if total_chunks == 0 {
            observer.on_progress(transfer_id, 100);
            return Ok(());
        }

        for (index, chunk) in file.data.chunks(self.config.chunk_size).enumerate() {
            let index = index as u32;
            if index > 0 && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }

            let is_last = index + 1 == total_chunks;
            self.send_file_chunk(transport, transfer_id, index, is_last, chunk, key)
                .await?;

            let gesendet = index + 1;
            if let Some(mut record) = self.aktiv.get_mut(transfer_id) {
                record.sent_chunks = gesendet;
            }
            let prozent = ((gesendet as u64 * 100) / total_chunks as u64) as u8;
            tracing::debug!(transfer_id, chunk = index, prozent, "Chunk gesendet");
            observer.on_progress(transfer_id, prozent);
        }

        Ok(())
    }

    /// Sendet einen einzelnen Chunk
    ///
    /// Mit Schluessel als `file-chunk` Text-Frame mit `encryptedData`,
    /// sonst als Binaer-Frame `[u32 BE Kopflaenge][JSON-Kopf][Rohdaten]`.
    pub async fn send_file_chunk(
        &self,
        transport: &dyn Transport,
        transfer_id: &str,
        chunk_index: u32,
        is_last_chunk: bool,
        data: &[u8],
        key: Option<&SecretBytes>,
    ) -> PeerResult<()> {
        let mut header = ChunkHeader {
            transfer_id: transfer_id.to_string(),
            chunk_index,
            is_last_chunk,
            encrypted_data: None,
        };

        let payload = match key {
            Some(key) => {
                header.encrypted_data = Some(encrypt_bytes(data, key.as_bytes())?);
                PeerFrame::FileChunk(header).to_payload()?
            }
            None => Payload::Binary(self.codec.encode(&header, data)?),
        };

        transport.send(payload).await?;
        Ok(())
    }

    /// Verarbeitet eingehende Daten (Text oder Binaer)
    ///
    /// Fehler auf dem Empfangsweg werden geloggt und verworfen.
    pub async fn handle_received_data(
        &self,
        payload: &Payload,
        key: Option<&SecretBytes>,
        handler: &dyn InboundHandler,
    ) {
        self.router.route(payload, key, handler).await;
    }
}
