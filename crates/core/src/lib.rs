//! whisperlink-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die alle anderen
//! Whisperlink-Crates teilen: Payload- und Statustypen, den Transport-Vertrag
//! (send/on/status), den Persistenz-Vertrag und einen In-Memory-Transport
//! fuer Tests und den Loopback-Selbsttest.

pub mod error;
pub mod event;
pub mod memory;
pub mod persistence;
pub mod transport;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{CoreError, CoreResult};
pub use event::TransportEvent;
pub use memory::MemoryTransport;
pub use persistence::{MemoryPersistence, Persistence};
pub use transport::{PeerConnector, Transport};
pub use types::{ConnectionStatus, Payload};
