//! Gruppenschluessel-Verwaltung
//!
//! Haelt pro Gruppe genau den Schluessel mit der hoechsten bekannten
//! Version. Thread-safe via DashMap.

use std::sync::Arc;

use dashmap::DashMap;
use whisperlink_protocol::EncryptedEnvelope;

use super::decrypt::decrypt_message;
use super::encrypt::encrypt_message;
use super::group_key::{create_group_key, import_group_key, rotate_group_key};
use crate::error::{CryptoError, CryptoResult};
use crate::types::GroupKeyEntry;

/// Verwaltet die Schluessel aller Gruppen dieses Peers
#[derive(Debug, Default)]
pub struct GroupKeyManager {
    keys: DashMap<String, Arc<GroupKeyEntry>>,
}

impl GroupKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Erzeugt Version 1 fuer eine Gruppe und ersetzt einen vorhandenen Schluessel
    pub fn create_group_key(&self, group_id: &str) -> CryptoResult<Arc<GroupKeyEntry>> {
        let entry = Arc::new(create_group_key(group_id, 1)?);
        self.keys.insert(group_id.to_string(), Arc::clone(&entry));
        Ok(entry)
    }

    pub fn get(&self, group_id: &str) -> Option<Arc<GroupKeyEntry>> {
        self.keys.get(group_id).map(|e| Arc::clone(e.value()))
    }

    pub fn get_group_key(&self, group_id: &str) -> CryptoResult<Arc<GroupKeyEntry>> {
        self.get(group_id).ok_or_else(|| CryptoError::KeinSchluessel {
            group_id: group_id.to_string(),
        })
    }

    pub fn has_key(&self, group_id: &str) -> bool {
        self.keys.contains_key(group_id)
    }

    pub fn current_version(&self, group_id: &str) -> Option<u32> {
        self.keys.get(group_id).map(|e| e.version)
    }

    /// Rotiert den Schluessel einer Gruppe (Version + 1)
    pub fn rotate_key(&self, group_id: &str) -> CryptoResult<Arc<GroupKeyEntry>> {
        let current = self.get_group_key(group_id)?;
        let next = Arc::new(rotate_group_key(&current)?);
        self.keys.insert(group_id.to_string(), Arc::clone(&next));

        tracing::info!(group_id, version = next.version, "Gruppenschluessel rotiert");
        Ok(next)
    }

    /// Uebernimmt einen verteilten Schluessel
    ///
    /// Aeltere Versionen als die vorhandene werden ignoriert (`Ok(false)`).
    pub fn import_key(&self, group_id: &str, key_base64: &str, version: u32) -> CryptoResult<bool> {
        if let Some(vorhanden) = self.current_version(group_id) {
            if vorhanden > version {
                tracing::debug!(
                    group_id,
                    vorhanden,
                    version,
                    "Veralteter Gruppenschluessel ignoriert"
                );
                return Ok(false);
            }
        }

        let entry = import_group_key(group_id, key_base64, version)?;
        self.keys.insert(group_id.to_string(), Arc::new(entry));
        tracing::debug!(group_id, version, "Gruppenschluessel importiert");
        Ok(true)
    }

    pub fn remove_group(&self, group_id: &str) -> bool {
        self.keys.remove(group_id).is_some()
    }

    pub fn group_count(&self) -> usize {
        self.keys.len()
    }

    /// Verschluesselt mit dem aktuellen Gruppenschluessel, liefert (Version, Umschlag)
    pub fn encrypt_for_group(
        &self,
        group_id: &str,
        plaintext: &str,
    ) -> CryptoResult<(u32, EncryptedEnvelope)> {
        let entry = self.get_group_key(group_id)?;
        let envelope = encrypt_message(plaintext, entry.key.as_bytes())?;
        Ok((entry.version, envelope))
    }

    /// Entschluesselt; die Version muss zur aktuellen passen
    pub fn decrypt_for_group(
        &self,
        group_id: &str,
        version: u32,
        envelope: &EncryptedEnvelope,
    ) -> CryptoResult<String> {
        let entry = self.get_group_key(group_id)?;
        if entry.version != version {
            return Err(CryptoError::VersionMismatch {
                erwartet: entry.version,
                erhalten: version,
            });
        }
        decrypt_message(envelope, entry.key.as_bytes())
    }
}
