//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use chrono::{DateTime, Utc};

/// Oeffentlicher ECDH-Schluessel (P-256, 65 Bytes SEC1 unkomprimiert)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SecretBytes {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretBytes {}

/// Ergebnis eines ECDH-Austauschs
///
/// Der Schluessel ist direkt als AES-256-GCM-Schluessel nutzbar.
#[derive(Debug, Clone)]
pub struct SharedSecret {
    pub key: SecretBytes,
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

/// Symmetrischer Gruppenschluessel einer Gruppe
///
/// Wird bei Rotation ersetzt, nicht zusammengefuehrt.
#[derive(Clone)]
pub struct GroupKeyEntry {
    pub group_id: String,
    /// 32 Bytes AES-256-GCM
    pub key: SecretBytes,
    /// Derselbe Schluessel Base64-kodiert (fuer `group-key-distribution`)
    pub key_base64: String,
    /// Monoton steigend, beginnt bei 1
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for GroupKeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyEntry")
            .field("group_id", &self.group_id)
            .field("key", &self.key)
            .field("version", &self.version)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_bytes_debug_ist_redigiert() {
        let secret = SecretBytes::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", secret), "SecretBytes([REDACTED] 3 bytes)");
    }

    #[test]
    fn group_key_entry_debug_zeigt_kein_base64() {
        let entry = GroupKeyEntry {
            group_id: "g".into(),
            key: SecretBytes::new(vec![7; 32]),
            key_base64: "GEHEIM".into(),
            version: 1,
            created_at: Utc::now(),
        };
        let debug = format!("{:?}", entry);
        assert!(!debug.contains("GEHEIM"));
        assert!(debug.contains("version: 1"));
    }
}
