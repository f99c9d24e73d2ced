//! E2E Verschluesselung (Peer <-> Peer)
//!
//! Zwei Peers handeln ueber einen ephemeren ECDH-Austausch (P-256) einen
//! gemeinsamen AES-256-GCM-Schluessel aus. Gruppen nutzen einen separaten
//! symmetrischen Schluessel der ueber die bereits verschluesselten
//! Einzelverbindungen verteilt wird.
//!
//! ## Ablauf
//! 1. `EncryptionSession::initialize` erzeugt ein Schluesselpaar
//! 2. Der oeffentliche Schluessel geht als `encryption-key` Frame raus
//! 3. `process_remote_public_key` leitet den Session-Schluessel ab
//! 4. Nachrichten und Chunks werden als `encrypted-*` Umschlaege versendet

pub mod decrypt;
pub mod encrypt;
pub mod group_key;
pub mod key_exchange;
pub mod key_manager;
pub mod session;

pub use decrypt::{decrypt_bytes, decrypt_message, decrypt_raw};
pub use encrypt::{canonical_json, encrypt_bytes, encrypt_json, encrypt_message, encrypt_raw};
pub use group_key::{create_group_key, import_group_key, rotate_group_key};
pub use key_exchange::{
    derive_shared_secret, export_public_key, generate_key_pair, import_public_key, KeyPair,
};
pub use key_manager::GroupKeyManager;
pub use session::{EncryptionSession, SessionState};

/// AES-256-GCM Schluessellaenge in Bytes
pub const AES_KEY_LEN: usize = 32;

/// AES-GCM IV-Laenge in Bytes
pub const IV_LEN: usize = 12;

/// AES-GCM Auth-Tag-Laenge in Bytes
pub const TAG_LEN: usize = 16;
