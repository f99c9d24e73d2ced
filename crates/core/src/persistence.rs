//! Persistenz-Vertrag
//!
//! Schluessel/Wert-Speicher mit String-Werten (im Browser: localStorage).
//! `get_bool`/`set_bool` sind auf `get_item`/`set_item` abgebildet.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::CoreResult;

/// Dauerhafter Schluessel/Wert-Speicher der Host-Anwendung
pub trait Persistence: Send + Sync {
    fn get_item(&self, key: &str) -> CoreResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> CoreResult<()>;

    fn remove_item(&self, key: &str) -> CoreResult<()>;

    /// Liest einen Boolean; fehlende oder ungueltige Werte ergeben `default`
    fn get_bool(&self, key: &str, default: bool) -> CoreResult<bool> {
        Ok(match self.get_item(key)?.as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        })
    }

    fn set_bool(&self, key: &str, value: bool) -> CoreResult<()> {
        self.set_item(key, if value { "true" } else { "false" })
    }
}

/// Fluechtiger Speicher im Arbeitsspeicher (Tests, Einmal-Sessions)
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    eintraege: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anzahl gespeicherter Schluessel
    pub fn len(&self) -> usize {
        self.eintraege.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.lock().is_empty()
    }
}

impl Persistence for MemoryPersistence {
    fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.eintraege.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        self.eintraege
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> CoreResult<()> {
        self.eintraege.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_setzen_lesen_loeschen() {
        let store = MemoryPersistence::new();
        assert_eq!(store.get_item("a").unwrap(), None);

        store.set_item("a", "1").unwrap();
        assert_eq!(store.get_item("a").unwrap().as_deref(), Some("1"));

        store.remove_item("a").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn bool_werte() {
        let store = MemoryPersistence::new();
        assert!(store.get_bool("flag", true).unwrap());

        store.set_bool("flag", false).unwrap();
        assert!(!store.get_bool("flag", true).unwrap());
        assert_eq!(store.get_item("flag").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn ungueltiger_bool_faellt_auf_default() {
        let store = MemoryPersistence::new();
        store.set_item("flag", "vielleicht").unwrap();
        assert!(store.get_bool("flag", true).unwrap());
    }
}
