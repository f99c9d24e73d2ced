//! Whisperlink Knoten – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt den
//! Loopback-Selbsttest aus. Optionales erstes Argument: Pfad der Datei die
//! uebertragen werden soll.

use anyhow::Result;
use whisperlink_node::{config::NodeConfig, Node};
use whisperlink_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("WL_CONFIG").unwrap_or_else(|_| "whisperlink.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = NodeConfig::laden(&config_pfad)?;

    let format = logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        log_format = ?format,
        "Whisperlink Knoten wird initialisiert"
    );

    let datei_pfad = std::env::args().nth(1);
    let datei = Node::datei_vorbereiten(datei_pfad.as_deref()).await?;

    let bericht = Node::neu(config).starten(datei).await?;
    tracing::info!(nachricht = %bericht.nachricht, "Fertig");

    Ok(())
}
