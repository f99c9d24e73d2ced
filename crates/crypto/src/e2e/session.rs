//! Session-State-Machine fuer eine Peer-Verbindung
//!
//! ```text
//! Uninitialized --initialize--> AwaitingRemoteKey --remote key--> Ready
//!       ^                                                          |
//!       +------------------------- reset --------------------------+
//! ```
//!
//! Verschluesselung ist erst im Zustand `Ready` moeglich. Nach `Ready` ist
//! das lokale Schluesselpaar verbraucht; ein neuer Austausch braucht `reset`.

use serde::Serialize;
use whisperlink_protocol::{EncryptedEnvelope, PeerFrame};

use super::decrypt::{decrypt_bytes, decrypt_message, decrypt_raw};
use super::encrypt::{encrypt_bytes, encrypt_json, encrypt_message, encrypt_raw};
use super::key_exchange::{export_public_key, generate_key_pair, import_public_key, KeyPair};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{PublicKey, SecretBytes, SharedSecret};

/// Beobachtbarer Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    AwaitingRemoteKey,
    Ready,
}

enum Zustand {
    Uninitialisiert,
    WartetAufRemoteKey {
        key_pair: KeyPair,
    },
    Bereit {
        secret: SharedSecret,
        remote_public_key: PublicKey,
    },
}

/// Verschluesselungs-Session mit genau einem Gegenueber
pub struct EncryptionSession {
    zustand: Zustand,
    local_public_key: Option<String>,
}

impl std::fmt::Debug for EncryptionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionSession")
            .field("state", &self.state())
            .field("local_public_key", &self.local_public_key)
            .finish()
    }
}

impl Default for EncryptionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionSession {
    pub fn new() -> Self {
        Self {
            zustand: Zustand::Uninitialisiert,
            local_public_key: None,
        }
    }

    /// Erzeugt ein frisches Schluesselpaar und liefert den Public Key (Base64)
    ///
    /// Ein erneuter Aufruf verwirft jeden vorherigen Zustand.
    pub fn initialize(&mut self) -> CryptoResult<String> {
        let key_pair = generate_key_pair()?;
        let exportiert = export_public_key(&key_pair.public_key);

        self.zustand = Zustand::WartetAufRemoteKey { key_pair };
        self.local_public_key = Some(exportiert.clone());

        tracing::debug!("Session initialisiert, warte auf Remote-Key");
        Ok(exportiert)
    }

    /// Verarbeitet den Public Key des Gegenuebers und leitet den Session-Schluessel ab
    pub fn process_remote_public_key(&mut self, remote_base64: &str) -> CryptoResult<()> {
        match self.zustand {
            Zustand::Uninitialisiert => return Err(CryptoError::NichtInitialisiert),
            Zustand::Bereit { .. } => {
                return Err(CryptoError::KeyExchange(
                    "Session bereits bereit, vorher reset() aufrufen".into(),
                ))
            }
            Zustand::WartetAufRemoteKey { .. } => {}
        }

        // Import zuerst: ein ungueltiger Key laesst den Zustand unveraendert
        let remote = import_public_key(remote_base64)?;

        let Zustand::WartetAufRemoteKey { key_pair } =
            std::mem::replace(&mut self.zustand, Zustand::Uninitialisiert)
        else {
            return Err(CryptoError::NichtInitialisiert);
        };

        let secret = key_pair.derive(&remote)?;
        self.zustand = Zustand::Bereit {
            secret,
            remote_public_key: remote,
        };

        tracing::info!("Key-Exchange abgeschlossen, Session bereit");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.zustand, Zustand::Bereit { .. })
    }

    pub fn state(&self) -> SessionState {
        match self.zustand {
            Zustand::Uninitialisiert => SessionState::Uninitialized,
            Zustand::WartetAufRemoteKey { .. } => SessionState::AwaitingRemoteKey,
            Zustand::Bereit { .. } => SessionState::Ready,
        }
    }

    /// Lokaler Public Key (Base64), falls initialisiert
    pub fn local_public_key(&self) -> Option<&str> {
        self.local_public_key.as_deref()
    }

    /// Public Key des Gegenuebers, sobald die Session bereit ist
    pub fn remote_public_key(&self) -> Option<&PublicKey> {
        match &self.zustand {
            Zustand::Bereit {
                remote_public_key, ..
            } => Some(remote_public_key),
            _ => None,
        }
    }

    /// Session-Schluessel (32 Bytes)
    pub fn shared_key(&self) -> CryptoResult<&SecretBytes> {
        match &self.zustand {
            Zustand::Bereit { secret, .. } => Ok(&secret.key),
            _ => Err(CryptoError::HandshakeUnvollstaendig),
        }
    }

    pub fn encrypt_message(&self, plaintext: &str) -> CryptoResult<EncryptedEnvelope> {
        encrypt_message(plaintext, self.shared_key()?.as_bytes())
    }

    pub fn encrypt_json<T: Serialize + ?Sized>(&self, value: &T) -> CryptoResult<EncryptedEnvelope> {
        encrypt_json(value, self.shared_key()?.as_bytes())
    }

    pub fn decrypt_message(&self, envelope: &EncryptedEnvelope) -> CryptoResult<String> {
        decrypt_message(envelope, self.shared_key()?.as_bytes())
    }

    pub fn encrypt_bytes(&self, data: &[u8]) -> CryptoResult<EncryptedEnvelope> {
        encrypt_bytes(data, self.shared_key()?.as_bytes())
    }

    pub fn decrypt_bytes(&self, envelope: &EncryptedEnvelope) -> CryptoResult<Vec<u8>> {
        decrypt_bytes(envelope, self.shared_key()?.as_bytes())
    }

    pub fn encrypt_raw(&self, data_base64: &str) -> CryptoResult<EncryptedEnvelope> {
        encrypt_raw(data_base64, self.shared_key()?.as_bytes())
    }

    pub fn decrypt_raw(&self, envelope: &EncryptedEnvelope) -> CryptoResult<String> {
        decrypt_raw(envelope, self.shared_key()?.as_bytes())
    }

    /// Verwirft alles Schluesselmaterial
    pub fn reset(&mut self) {
        self.zustand = Zustand::Uninitialisiert;
        self.local_public_key = None;
        tracing::debug!("Session zurueckgesetzt");
    }

    /// Baut den `encryption-key` Frame fuer einen Public Key
    pub fn create_key_exchange_message(public_key_base64: &str) -> PeerFrame {
        PeerFrame::EncryptionKey {
            public_key: public_key_base64.to_string(),
        }
    }
}
