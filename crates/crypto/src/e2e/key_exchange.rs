//! ECDH Key Exchange (P-256)
//!
//! Oeffentliche Schluessel reisen als Base64 der 65 Byte SEC1-Form
//! (`0x04 || X || Y`). Beim Import wird zusaetzlich SPKI/DER akzeptiert.
//! Das Ergebnis der Vereinbarung (die 32 Byte X-Koordinate) wird ohne
//! weitere Ableitung als AES-256-GCM-Schluessel verwendet.

use ring::agreement::{self, EphemeralPrivateKey, UnparsedPublicKey, ECDH_P256};
use ring::rand::SystemRandom;

use crate::codec::{base64_to_bytes, bytes_to_base64};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{PublicKey, SecretBytes, SharedSecret};

/// Laenge eines unkomprimierten P-256 Punktes
pub const P256_PUBLIC_KEY_LEN: usize = 65;

/// DER-Praefix eines SubjectPublicKeyInfo fuer P-256 (id-ecPublicKey, prime256v1)
const P256_SPKI_PRAEFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// Ephemeres Schluesselpaar
///
/// Der private Schluessel verlaesst den Prozess nie und kann genau einmal
/// fuer eine Vereinbarung verwendet werden.
pub struct KeyPair {
    private_key: EphemeralPrivateKey,
    pub public_key: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl KeyPair {
    /// Vereinbart den Session-Schluessel mit dem Gegenueber (verbraucht das Paar)
    pub fn derive(self, remote: &PublicKey) -> CryptoResult<SharedSecret> {
        derive_shared_secret(self, remote)
    }
}

/// Erzeugt ein neues ephemeres P-256 Schluesselpaar
pub fn generate_key_pair() -> CryptoResult<KeyPair> {
    let rng = SystemRandom::new();
    let private_key = EphemeralPrivateKey::generate(&ECDH_P256, &rng).map_err(|_| {
        CryptoError::KryptoNichtVerfuegbar("P-256 Schluesselerzeugung fehlgeschlagen".into())
    })?;
    let public_key = private_key.compute_public_key().map_err(|_| {
        CryptoError::KryptoNichtVerfuegbar("Public Key nicht berechenbar".into())
    })?;

    Ok(KeyPair {
        private_key,
        public_key: PublicKey::new(public_key.as_ref().to_vec()),
    })
}

/// Exportiert einen oeffentlichen Schluessel als Base64 (65 Byte SEC1)
pub fn export_public_key(key: &PublicKey) -> String {
    bytes_to_base64(key.as_bytes())
}

/// Importiert einen Base64-kodierten oeffentlichen Schluessel
///
/// Akzeptiert rohe 65 Byte SEC1 oder SPKI/DER. Der Punkt wird dabei
/// gegen die Kurve geprueft.
pub fn import_public_key(encoded: &str) -> CryptoResult<PublicKey> {
    let raw = base64_to_bytes(encoded)
        .map_err(|e| CryptoError::UngueltigeSchluesselKodierung(e.to_string()))?;

    let punkt = if raw.starts_with(&P256_SPKI_PRAEFIX) {
        raw[P256_SPKI_PRAEFIX.len()..].to_vec()
    } else {
        raw
    };

    if punkt.len() != P256_PUBLIC_KEY_LEN || punkt[0] != 0x04 {
        return Err(CryptoError::UngueltigeSchluesselKodierung(format!(
            "Erwartet {} Byte unkomprimierten P-256 Punkt, erhalten {} Bytes",
            P256_PUBLIC_KEY_LEN,
            punkt.len()
        )));
    }

    // Kurvenpruefung: Vereinbarung mit einem Wegwerf-Schluessel
    let pruefpaar = generate_key_pair()?;
    agreement::agree_ephemeral(
        pruefpaar.private_key,
        &UnparsedPublicKey::new(&ECDH_P256, &punkt),
        |_| (),
    )
    .map_err(|_| CryptoError::UngueltigeSchluesselKodierung("Punkt liegt nicht auf P-256".into()))?;

    Ok(PublicKey::new(punkt))
}

/// Leitet den gemeinsamen AES-256-GCM-Schluessel ab
pub fn derive_shared_secret(key_pair: KeyPair, remote: &PublicKey) -> CryptoResult<SharedSecret> {
    let peer_key = UnparsedPublicKey::new(&ECDH_P256, remote.as_bytes());
    let key = agreement::agree_ephemeral(key_pair.private_key, &peer_key, |material| {
        SecretBytes::new(material.to_vec())
    })
    .map_err(|_| CryptoError::KeyExchange("ECDH-Vereinbarung fehlgeschlagen".into()))?;

    Ok(SharedSecret { key })
}
