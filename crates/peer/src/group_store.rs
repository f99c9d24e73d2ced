//! GroupStore – Gruppen und System-Nachrichten persistieren
//!
//! Gruppen liegen als JSON-Map `groupId -> Gruppe` unter `{namespace}_groups`,
//! System-Nachrichten als `groupId -> [Nachricht]` unter
//! `{namespace}_group_messages`. Schluessel werden nie persistiert.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use whisperlink_core::Persistence;
use whisperlink_protocol::Group;

use crate::error::{PeerError, PeerResult};
use crate::system_message::SystemMessage;

/// Persistente Gruppen-Ablage eines Peers
pub struct GroupStore {
    persistence: Arc<dyn Persistence>,
    namespace: String,
    gruppen: Mutex<HashMap<String, Group>>,
    nachrichten: Mutex<HashMap<String, Vec<SystemMessage>>>,
}

impl std::fmt::Debug for GroupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupStore")
            .field("namespace", &self.namespace)
            .field("gruppen", &self.gruppen.lock().len())
            .finish()
    }
}

impl GroupStore {
    /// Laedt Gruppen und Nachrichten aus der Persistenz
    pub fn laden(persistence: Arc<dyn Persistence>, namespace: &str) -> PeerResult<Self> {
        let store = Self {
            persistence,
            namespace: namespace.to_string(),
            gruppen: Mutex::new(HashMap::new()),
            nachrichten: Mutex::new(HashMap::new()),
        };

        if let Some(json) = store.persistence.get_item(&store.gruppen_key())? {
            let gruppen: HashMap<String, Group> = serde_json::from_str(&json)?;
            *store.gruppen.lock() = gruppen;
        }
        if let Some(json) = store.persistence.get_item(&store.nachrichten_key())? {
            let nachrichten: HashMap<String, Vec<SystemMessage>> = serde_json::from_str(&json)?;
            *store.nachrichten.lock() = nachrichten;
        }

        tracing::debug!(
            namespace,
            gruppen = store.gruppen.lock().len(),
            "Gruppen geladen"
        );
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn gruppen_key(&self) -> String {
        format!("{}_groups", self.namespace)
    }

    fn nachrichten_key(&self) -> String {
        format!("{}_group_messages", self.namespace)
    }

    pub fn get(&self, group_id: &str) -> Option<Group> {
        self.gruppen.lock().get(group_id).cloned()
    }

    pub fn enthaelt(&self, group_id: &str) -> bool {
        self.gruppen.lock().contains_key(group_id)
    }

    /// Alle Gruppen, aelteste zuerst
    pub fn alle(&self) -> Vec<Group> {
        let mut gruppen: Vec<Group> = self.gruppen.lock().values().cloned().collect();
        gruppen.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        gruppen
    }

    /// Fuegt eine Gruppe ein oder ersetzt sie und persistiert
    pub fn speichern(&self, group: Group) -> PeerResult<()> {
        let json = {
            let mut gruppen = self.gruppen.lock();
            gruppen.insert(group.id.clone(), group);
            serialisieren(&gruppen)?
        };
        self.persistence.set_item(&self.gruppen_key(), &json)?;
        Ok(())
    }

    /// Aendert eine Gruppe atomar und persistiert
    ///
    /// Schlaegt die Aenderung fehl, bleibt die Gruppe unveraendert.
    pub fn aktualisieren<F>(&self, group_id: &str, aenderung: F) -> PeerResult<Group>
    where
        F: FnOnce(&mut Group) -> PeerResult<()>,
    {
        let (neu, json) = {
            let mut gruppen = self.gruppen.lock();
            let mut kopie = gruppen
                .get(group_id)
                .cloned()
                .ok_or_else(|| PeerError::GruppeNichtGefunden(group_id.to_string()))?;
            aenderung(&mut kopie)?;
            gruppen.insert(group_id.to_string(), kopie.clone());
            (kopie, serialisieren(&gruppen)?)
        };
        self.persistence.set_item(&self.gruppen_key(), &json)?;
        Ok(neu)
    }

    pub fn entfernen(&self, group_id: &str) -> PeerResult<Option<Group>> {
        let (entfernt, json) = {
            let mut gruppen = self.gruppen.lock();
            let entfernt = gruppen.remove(group_id);
            (entfernt, serialisieren(&gruppen)?)
        };
        self.persistence.set_item(&self.gruppen_key(), &json)?;

        let json = {
            let mut nachrichten = self.nachrichten.lock();
            nachrichten.remove(group_id);
            serialisieren(&nachrichten)?
        };
        self.persistence.set_item(&self.nachrichten_key(), &json)?;
        Ok(entfernt)
    }

    /// Haengt eine System-Nachricht an den Verlauf an und persistiert
    pub fn nachricht_anhaengen(&self, nachricht: SystemMessage) -> PeerResult<()> {
        let json = {
            let mut nachrichten = self.nachrichten.lock();
            nachrichten
                .entry(nachricht.group_id.clone())
                .or_default()
                .push(nachricht);
            serialisieren(&nachrichten)?
        };
        self.persistence.set_item(&self.nachrichten_key(), &json)?;
        Ok(())
    }

    pub fn nachrichten(&self, group_id: &str) -> Vec<SystemMessage> {
        self.nachrichten
            .lock()
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Stabile Ausgabe: Schluessel sortiert
fn serialisieren<V: serde::Serialize>(map: &HashMap<String, V>) -> PeerResult<String> {
    let sortiert: BTreeMap<&String, &V> = map.iter().collect();
    Ok(serde_json::to_string(&sortiert)?)
}
