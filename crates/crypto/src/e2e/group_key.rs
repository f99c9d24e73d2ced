//! Gruppenschluessel erzeugen, rotieren und importieren

use chrono::Utc;

use super::AES_KEY_LEN;
use crate::codec::{base64_to_bytes, bytes_to_base64, random_bytes};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{GroupKeyEntry, SecretBytes};

/// Erzeugt einen neuen zufaelligen AES-256 Gruppenschluessel
pub fn create_group_key(group_id: &str, version: u32) -> CryptoResult<GroupKeyEntry> {
    let key_bytes = random_bytes::<AES_KEY_LEN>()?;
    let entry = GroupKeyEntry {
        group_id: group_id.to_string(),
        key_base64: bytes_to_base64(&key_bytes),
        key: SecretBytes::new(key_bytes.to_vec()),
        version,
        created_at: Utc::now(),
    };

    tracing::debug!(group_id, version, "Gruppenschluessel erzeugt");
    Ok(entry)
}

/// Rotiert einen Schluessel: neuer Zufall, Version + 1
pub fn rotate_group_key(current: &GroupKeyEntry) -> CryptoResult<GroupKeyEntry> {
    create_group_key(&current.group_id, current.version.saturating_add(1))
}

/// Uebernimmt einen verteilten Schluessel (Base64, 32 Bytes)
pub fn import_group_key(group_id: &str, key_base64: &str, version: u32) -> CryptoResult<GroupKeyEntry> {
    let key_bytes = base64_to_bytes(key_base64)
        .map_err(|e| CryptoError::UngueltigeSchluesselKodierung(e.to_string()))?;
    if key_bytes.len() != AES_KEY_LEN {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: AES_KEY_LEN,
            erhalten: key_bytes.len(),
        });
    }

    Ok(GroupKeyEntry {
        group_id: group_id.to_string(),
        key: SecretBytes::new(key_bytes),
        key_base64: key_base64.trim().to_string(),
        version,
        created_at: Utc::now(),
    })
}
