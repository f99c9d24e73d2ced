//! whisperlink-peer – Nachrichten und Dateien zwischen zwei Peers
//!
//! Dieses Crate implementiert:
//! - TransferEngine: Dateien in Chunks senden (verschluesselt oder Binaer-Frame)
//! - IncomingTransfer/EmpfangsPuffer: Empfangsseitiges Zusammensetzen
//! - MessageRouter: Eingehende Frames klassifizieren und verteilen
//! - ConnectionQueue: Sende-Warteschlange bis der Kanal offen ist
//! - GroupKeyCoordinator: Gruppen anlegen, einladen, Schluessel verteilen
//! - GroupStore: Persistenz von Gruppen und System-Nachrichten
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use whisperlink_core::{MemoryTransport, Transport};
//! use whisperlink_peer::{NullBeobachter, OutgoingFile, TransferConfig, TransferEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (alice, _bob) = MemoryTransport::paar("alice", "bob");
//!     let engine = TransferEngine::neu(TransferConfig::default());
//!     let datei = OutgoingFile::neu("notiz.txt", "text/plain", b"Hallo".to_vec());
//!     let transport: Arc<dyn Transport> = alice;
//!     engine
//!         .send_file(transport.as_ref(), &datei, None, &NullBeobachter)
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod error;
pub mod group;
pub mod group_store;
pub mod queue;
pub mod reassembly;
pub mod router;
pub mod system_message;
pub mod transfer;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use error::{PeerError, PeerResult};
pub use group::GroupKeyCoordinator;
pub use group_store::GroupStore;
pub use queue::{ConnectionQueue, SendOutcome};
pub use reassembly::{EmpfangsPuffer, IncomingTransfer};
pub use router::{InboundFrame, InboundHandler, MessageRouter};
pub use system_message::{format_system_message, SystemAction, SystemMessage};
pub use transfer::{
    NullBeobachter, OutgoingFile, TransferConfig, TransferEngine, TransferObserver, TransferRecord,
    CHUNK_DELAY_MS, CHUNK_SIZE,
};
