//! whisperlink-protocol – Wire-Format des Peer-Protokolls
//!
//! Dieses Crate definiert alle Frames die zwischen zwei Peers ausgetauscht
//! werden. Unabhaengige Implementierungen muessen exakt dieses Format
//! sprechen, deshalb sind Feldnamen und `type`-Werte fest.

pub mod envelope;
pub mod frames;
pub mod group;
pub mod wire;

pub use envelope::EncryptedEnvelope;
pub use frames::{ChunkHeader, FileMetadata, GroupInvite, GroupInviteAccepted, PeerFrame};
pub use group::{Group, GroupMember, GroupRole, GroupSettings, GroupType, JoinMode};
pub use wire::ChunkFrameCodec;
