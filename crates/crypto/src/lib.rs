//! # whisperlink-crypto
//!
//! Ende-zu-Ende-Verschluesselung fuer das Peer-Protokoll.
//!
//! ## Module
//! - `codec` - Binaer/Base64/Text-Konvertierungen
//! - `e2e` - Key Exchange, Session-Cipher, Session-State-Machine, Gruppenschluessel
//! - `types` - Gemeinsame Typen (SecretBytes, PublicKey, SharedSecret, GroupKeyEntry)
//! - `error` - Fehlertypen

pub mod codec;
pub mod e2e;
pub mod error;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use types::{GroupKeyEntry, PublicKey, SecretBytes, SharedSecret};

pub use e2e::{
    create_group_key, decrypt_bytes, decrypt_message, decrypt_raw, derive_shared_secret,
    encrypt_bytes, encrypt_json, encrypt_message, encrypt_raw, export_public_key,
    generate_key_pair, import_group_key, import_public_key, rotate_group_key,
    EncryptionSession, GroupKeyManager, KeyPair, SessionState,
};
