//! Binaer-Frame fuer unverschluesselte Datei-Chunks
//!
//! Vermeidet den Base64-Aufschlag wenn keine Vertraulichkeit noetig ist.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+----...----+
//! | Kopf-Laenge (u32 BE)              | JSON-Kopf | Rohdaten  |
//! +--------+--------+--------+--------+----...----+----...----+
//! ```
//!
//! Der Kopf ist ein `file-chunk`-Frame ohne `encryptedData`. Alles nach dem
//! Kopf ist Chunk-Payload. Die maximale Kopf-Groesse ist konfigurierbar
//! (Standard: 64 KB).

use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use crate::frames::{ChunkHeader, PeerFrame};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Kopf-Groesse (64 KB)
pub const DEFAULT_MAX_HEADER_SIZE: usize = 64 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// ChunkFrameCodec
// ---------------------------------------------------------------------------

/// Kodiert und dekodiert Binaer-Chunk-Frames
///
/// Der Transport liefert ganze Nachrichten, deshalb arbeitet der Codec auf
/// vollstaendigen Buffern statt auf einem Byte-Strom.
#[derive(Debug, Clone)]
pub struct ChunkFrameCodec {
    /// Maximale erlaubte Kopf-Groesse in Bytes
    max_header_size: usize,
}

impl ChunkFrameCodec {
    /// Erstellt einen neuen `ChunkFrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
        }
    }

    /// Erstellt einen Codec mit benutzerdefinierter maximaler Kopf-Groesse
    pub fn with_max_header_size(max_header_size: usize) -> Self {
        Self { max_header_size }
    }

    /// Gibt die konfigurierte maximale Kopf-Groesse zurueck
    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    /// Baut einen Binaer-Frame aus Kopf und Rohdaten
    ///
    /// Ein eventuell gesetztes `encrypted_data` wird nicht mitkodiert.
    pub fn encode(&self, header: &ChunkHeader, data: &[u8]) -> io::Result<Bytes> {
        let kopf = PeerFrame::FileChunk(ChunkHeader {
            encrypted_data: None,
            ..header.clone()
        });
        let json = serde_json::to_vec(&kopf).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        if json.len() > self.max_header_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Kopf zu gross: {} Bytes (Maximum: {} Bytes)",
                    json.len(),
                    self.max_header_size
                ),
            ));
        }

        let mut buf = BytesMut::with_capacity(LENGTH_FIELD_SIZE + json.len() + data.len());
        buf.put_u32(json.len() as u32);
        buf.put_slice(&json);
        buf.put_slice(data);
        Ok(buf.freeze())
    }

    /// Zerlegt einen Binaer-Frame in Kopf und Rohdaten
    ///
    /// # Fehler
    /// - `InvalidData` wenn das Laengen-Feld fehlt, der Kopf ueber das Ende
    ///   des Frames reicht, zu gross ist oder kein gueltiges JSON enthaelt
    pub fn decode(&self, frame: &Bytes) -> io::Result<(ChunkHeader, Bytes)> {
        if frame.len() < LENGTH_FIELD_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Frame zu kurz fuer Laengen-Feld: {} Bytes", frame.len()),
            ));
        }

        let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

        if length > self.max_header_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Kopf zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_header_size
                ),
            ));
        }

        let kopf_ende = LENGTH_FIELD_SIZE + length;
        if frame.len() < kopf_ende {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Kopf unvollstaendig: erwartet {} Bytes, vorhanden {}",
                    length,
                    frame.len() - LENGTH_FIELD_SIZE
                ),
            ));
        }

        // Der Kopf wird direkt als ChunkHeader gelesen, ein fehlendes oder
        // abweichendes `type`-Feld ist toleriert
        let header: ChunkHeader =
            serde_json::from_slice(&frame[LENGTH_FIELD_SIZE..kopf_ende]).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("JSON-Deserialisierung fehlgeschlagen: {}", e),
                )
            })?;

        Ok((header, frame.slice(kopf_ende..)))
    }
}

impl Default for ChunkFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
