//! MessageRouter – eingehende Daten klassifizieren und verteilen
//!
//! ```text
//! Text  --kein JSON / kein type-->  on_message
//!       --bekannter type-------->   Frame (ggf. entschluesselt)
//!       --unbekannter type------>   on_unrecognized
//! Binaer --ChunkFrameCodec------>   on_file_chunk
//! ```
//!
//! Entschluesselungs- und Parse-Fehler werden geloggt und verworfen.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use whisperlink_core::Payload;
use whisperlink_crypto::{decrypt_bytes, decrypt_message, SecretBytes};
use whisperlink_protocol::{ChunkFrameCodec, ChunkHeader, FileMetadata, PeerFrame};

/// Ergebnis der Klassifizierung einer eingehenden Nachricht
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Reiner Text (kein JSON oder JSON ohne `type`)
    Text(String),
    /// Bekannter Frame
    Frame(PeerFrame),
    /// Unverschluesselter Chunk aus einem Binaer-Frame
    BinaryChunk { header: ChunkHeader, data: Bytes },
    /// Bekannter `type`, aber ungueltige Felder oder kaputter Binaer-Frame
    Malformed { grund: String },
    /// JSON mit unbekanntem `type`
    Unrecognized { typ: String, raw: Value },
}

/// Empfaenger fuer geroutete Nachrichten
///
/// Alle Methoden haben leere Standard-Implementierungen.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, _text: String) {}

    async fn on_key_exchange(&self, _public_key: String) {}

    async fn on_file_metadata(&self, _metadata: FileMetadata) {}

    async fn on_file_chunk(&self, _transfer_id: &str, _chunk_index: u32, _data: Bytes) {}

    async fn on_file_transfer_complete(&self, _transfer_id: &str) {}

    /// Alle `group-*` Frames
    async fn on_group_frame(&self, _frame: PeerFrame) {}

    async fn on_unrecognized(&self, _typ: &str, _raw: &Value) {}
}

/// Klassifiziert und verteilt eingehende Nachrichten
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    codec: ChunkFrameCodec,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(codec: ChunkFrameCodec) -> Self {
        Self { codec }
    }

    /// Klassifiziert ohne zu entschluesseln
    pub fn classify(&self, payload: &Payload) -> InboundFrame {
        match payload {
            Payload::Text(text) => classify_text(text),
            Payload::Binary(data) => match self.codec.decode(data) {
                Ok((header, data)) => InboundFrame::BinaryChunk { header, data },
                Err(e) => InboundFrame::Malformed {
                    grund: format!("Binaer-Frame: {}", e),
                },
            },
        }
    }

    /// Klassifiziert, entschluesselt verschluesselte Frames und ruft den Handler
    pub async fn route(&self, payload: &Payload, key: Option<&SecretBytes>, handler: &dyn InboundHandler) {
        let frame = match self.classify(payload) {
            InboundFrame::Frame(frame) => aufloesen(frame, key),
            andere => andere,
        };
        verteilen(frame, key, handler).await;
    }
}

/// Klassifiziert einen Text-Frame
pub fn classify_text(text: &str) -> InboundFrame {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return InboundFrame::Text(text.to_string());
    };
    let Some(typ) = value.get("type").and_then(Value::as_str).map(str::to_string) else {
        return InboundFrame::Text(text.to_string());
    };

    if !PeerFrame::ist_bekannter_typ(&typ) {
        return InboundFrame::Unrecognized { typ, raw: value };
    }

    match serde_json::from_value::<PeerFrame>(value) {
        Ok(frame) => InboundFrame::Frame(frame),
        Err(e) => InboundFrame::Malformed {
            grund: format!("{}: {}", typ, e),
        },
    }
}

/// Entschluesselt `encrypted-*` Frames und klassifiziert den Klartext
///
/// Nur eine Ebene: ein verschluesselter Frame im Klartext ist ungueltig.
fn aufloesen(frame: PeerFrame, key: Option<&SecretBytes>) -> InboundFrame {
    let Some(envelope) = frame.als_envelope() else {
        return InboundFrame::Frame(frame);
    };
    let Some(key) = key else {
        return InboundFrame::Malformed {
            grund: format!("{} ohne Session-Schluessel", frame.typ()),
        };
    };

    let klartext = match decrypt_message(&envelope, key.as_bytes()) {
        Ok(text) => text,
        Err(e) => {
            return InboundFrame::Malformed {
                grund: format!("Entschluesselung: {}", e),
            }
        }
    };

    match classify_text(&klartext) {
        InboundFrame::Frame(innen) if innen.als_envelope().is_some() => InboundFrame::Malformed {
            grund: "Verschachtelte Verschluesselung".into(),
        },
        andere => andere,
    }
}

async fn verteilen(frame: InboundFrame, key: Option<&SecretBytes>, handler: &dyn InboundHandler) {
    match frame {
        InboundFrame::Text(text) => handler.on_message(text).await,
        InboundFrame::Unrecognized { typ, raw } => {
            tracing::debug!(typ = %typ, "Unbekannter Frame-Typ");
            handler.on_unrecognized(&typ, &raw).await;
        }
        InboundFrame::Malformed { grund } => {
            tracing::warn!(grund = %grund, "Eingehende Nachricht verworfen");
        }
        InboundFrame::BinaryChunk { header, data } => chunk_melden(&header, data, handler).await,
        InboundFrame::Frame(frame) => match frame {
            PeerFrame::EncryptionKey { public_key } => handler.on_key_exchange(public_key).await,
            PeerFrame::FileMetadata(metadata) => handler.on_file_metadata(metadata).await,
            PeerFrame::FileChunk(header) => {
                let Some(envelope) = header.encrypted_data.as_ref() else {
                    tracing::warn!(
                        transfer_id = %header.transfer_id,
                        "file-chunk Text-Frame ohne encryptedData verworfen"
                    );
                    return;
                };
                let Some(key) = key else {
                    tracing::warn!(
                        transfer_id = %header.transfer_id,
                        "Verschluesselter Chunk ohne Session-Schluessel verworfen"
                    );
                    return;
                };
                match decrypt_bytes(envelope, key.as_bytes()) {
                    Ok(data) => chunk_melden(&header, Bytes::from(data), handler).await,
                    Err(e) => tracing::warn!(
                        transfer_id = %header.transfer_id,
                        chunk = header.chunk_index,
                        fehler = %e,
                        "Chunk-Entschluesselung fehlgeschlagen"
                    ),
                }
            }
            PeerFrame::EncryptedMessage { .. } | PeerFrame::EncryptedBinary { .. } => {
                tracing::warn!("Verschluesselter Frame nach dem Aufloesen verworfen");
            }
            gruppe => handler.on_group_frame(gruppe).await,
        },
    }
}

async fn chunk_melden(header: &ChunkHeader, data: Bytes, handler: &dyn InboundHandler) {
    handler
        .on_file_chunk(&header.transfer_id, header.chunk_index, data)
        .await;
    if header.is_last_chunk {
        handler.on_file_transfer_complete(&header.transfer_id).await;
    }
}
