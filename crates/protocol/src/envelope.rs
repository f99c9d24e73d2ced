//! Verschluesselte Umschlaege
//!
//! Ein Umschlag traegt nur IV und Ciphertext (inkl. 16 Byte Auth-Tag),
//! beides Base64. Ohne den Schluessel der ihn erzeugt hat ist er wertlos;
//! kein Schluesselmaterial reist mit.
//!
//! ```text
//! {"type":"encrypted-message","iv":"...","ciphertext":"..."}
//! {"type":"encrypted-binary","iv":"...","encryptedData":"..."}
//! ```

use serde::{Deserialize, Serialize};

/// Art des Umschlags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeArt {
    /// Text oder kanonisch serialisiertes JSON
    Nachricht,
    /// Rohe Bytes (Datei-Chunks)
    Binaer,
}

/// AES-GCM-Umschlag wie er auf der Leitung steht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EncryptedEnvelope {
    EncryptedMessage {
        iv: String,
        ciphertext: String,
    },
    EncryptedBinary {
        iv: String,
        #[serde(rename = "encryptedData")]
        encrypted_data: String,
    },
}

impl EncryptedEnvelope {
    pub fn art(&self) -> EnvelopeArt {
        match self {
            EncryptedEnvelope::EncryptedMessage { .. } => EnvelopeArt::Nachricht,
            EncryptedEnvelope::EncryptedBinary { .. } => EnvelopeArt::Binaer,
        }
    }

    /// IV (Base64)
    pub fn iv(&self) -> &str {
        match self {
            EncryptedEnvelope::EncryptedMessage { iv, .. }
            | EncryptedEnvelope::EncryptedBinary { iv, .. } => iv,
        }
    }

    /// Ciphertext inkl. Auth-Tag (Base64)
    pub fn ciphertext(&self) -> &str {
        match self {
            EncryptedEnvelope::EncryptedMessage { ciphertext, .. } => ciphertext,
            EncryptedEnvelope::EncryptedBinary { encrypted_data, .. } => encrypted_data,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
