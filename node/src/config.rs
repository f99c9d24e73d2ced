//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Knoten ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use whisperlink_peer::{PeerResult, TransferConfig, CHUNK_DELAY_MS, CHUNK_SIZE};

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identitaet dieses Peers
    pub peer: PeerEinstellungen,
    /// Dateiversand
    pub transfer: TransferEinstellungen,
    /// Persistenz
    pub storage: StorageEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Identitaet dieses Peers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerEinstellungen {
    /// Peer-ID wie sie andere Peers sehen
    pub id: String,
    /// Anzeigename in Gruppen
    pub anzeigename: String,
}

impl Default for PeerEinstellungen {
    fn default() -> Self {
        Self {
            id: "whisperlink-local".into(),
            anzeigename: "Whisperlink".into(),
        }
    }
}

/// Dateiversand-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferEinstellungen {
    /// Chunk-Groesse in Bytes (1..=16384)
    pub chunk_size: usize,
    /// Pause zwischen zwei Chunks in Millisekunden
    pub chunk_delay_ms: u64,
}

impl Default for TransferEinstellungen {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            chunk_delay_ms: CHUNK_DELAY_MS,
        }
    }
}

/// Persistenz-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageEinstellungen {
    /// Pfad der JSON-Datei (leer = nur im Speicher)
    pub pfad: Option<String>,
    /// Praefix fuer alle Schluessel
    pub namespace: String,
}

impl Default for StorageEinstellungen {
    fn default() -> Self {
        Self {
            pfad: None,
            namespace: "whisperlink".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl NodeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                config.transfer_config()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Validierte Transfer-Einstellungen
    pub fn transfer_config(&self) -> PeerResult<TransferConfig> {
        TransferConfig::neu(self.transfer.chunk_size, self.transfer.chunk_delay_ms)
    }
}
