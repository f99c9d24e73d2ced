//! Datei-Persistenz: alle Schluessel in einer JSON-Datei
//!
//! Jede Aenderung schreibt die komplette Datei neu (erst temporaer, dann
//! Umbenennen), damit ein Absturz keine halbe Datei hinterlaesst.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use whisperlink_core::{CoreError, CoreResult, Persistence};

/// Persistenz auf einer einzelnen JSON-Datei
#[derive(Debug)]
pub struct JsonDateiPersistenz {
    pfad: PathBuf,
    daten: Mutex<BTreeMap<String, String>>,
}

impl JsonDateiPersistenz {
    /// Oeffnet die Datei; fehlt sie, wird mit leerem Inhalt begonnen
    pub fn oeffnen(pfad: impl AsRef<Path>) -> CoreResult<Self> {
        let pfad = pfad.as_ref().to_path_buf();
        let daten = match std::fs::read_to_string(&pfad) {
            Ok(inhalt) if inhalt.trim().is_empty() => BTreeMap::new(),
            Ok(inhalt) => serde_json::from_str(&inhalt)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(CoreError::Persistenz(format!(
                    "'{}' nicht lesbar: {}",
                    pfad.display(),
                    e
                )))
            }
        };

        tracing::debug!(pfad = %pfad.display(), eintraege = daten.len(), "Persistenz geoeffnet");
        Ok(Self {
            pfad,
            daten: Mutex::new(daten),
        })
    }

    pub fn pfad(&self) -> &Path {
        &self.pfad
    }

    fn schreiben(&self, daten: &BTreeMap<String, String>) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(daten)?;
        let temp = self.pfad.with_extension("tmp");

        std::fs::write(&temp, json)
            .and_then(|_| std::fs::rename(&temp, &self.pfad))
            .map_err(|e| {
                CoreError::Persistenz(format!("'{}' nicht schreibbar: {}", self.pfad.display(), e))
            })?;
        tracing::debug!(pfad = %self.pfad.display(), eintraege = daten.len(), "Persistenz geschrieben");
        Ok(())
    }
}

impl Persistence for JsonDateiPersistenz {
    fn get_item(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.daten.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut daten = self.daten.lock();
        daten.insert(key.to_string(), value.to_string());
        self.schreiben(&daten)
    }

    fn remove_item(&self, key: &str) -> CoreResult<()> {
        let mut daten = self.daten.lock();
        if daten.remove(key).is_some() {
            self.schreiben(&daten)?;
        }
        Ok(())
    }
}
