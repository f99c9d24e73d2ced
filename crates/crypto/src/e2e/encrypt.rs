//! AES-256-GCM Verschluesselung in Umschlaege
//!
//! ## Format
//! ```text
//! iv         = Base64(12 Byte Zufall, pro Aufruf neu)
//! ciphertext = Base64(AES-GCM(plaintext) || auth_tag(16))
//! ```
//!
//! Keine Additional Authenticated Data.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use serde::Serialize;
use serde_json::Value;
use whisperlink_protocol::EncryptedEnvelope;

use super::{AES_KEY_LEN, IV_LEN};
use crate::codec::{base64_to_bytes, bytes_to_base64, random_bytes};
use crate::error::{CryptoError, CryptoResult};

/// Verschluesselt Text als `encrypted-message`
pub fn encrypt_message(plaintext: &str, key: &[u8]) -> CryptoResult<EncryptedEnvelope> {
    let (iv, ciphertext) = versiegeln(plaintext.as_bytes(), key)?;
    Ok(EncryptedEnvelope::EncryptedMessage { iv, ciphertext })
}

/// Serialisiert einen Wert kanonisch und verschluesselt ihn als `encrypted-message`
pub fn encrypt_json<T: Serialize + ?Sized>(value: &T, key: &[u8]) -> CryptoResult<EncryptedEnvelope> {
    encrypt_message(&canonical_json(value)?, key)
}

/// Verschluesselt rohe Bytes als `encrypted-binary`
pub fn encrypt_bytes(data: &[u8], key: &[u8]) -> CryptoResult<EncryptedEnvelope> {
    let (iv, encrypted_data) = versiegeln(data, key)?;
    Ok(EncryptedEnvelope::EncryptedBinary { iv, encrypted_data })
}

/// Verschluesselt Base64-kodierte Binaerdaten als `encrypted-binary`
pub fn encrypt_raw(data_base64: &str, key: &[u8]) -> CryptoResult<EncryptedEnvelope> {
    let data = base64_to_bytes(data_base64)
        .map_err(|e| CryptoError::UngueltigeDaten(format!("Payload kein Base64: {}", e)))?;
    encrypt_bytes(&data, key)
}

/// Kanonisches JSON: Objekt-Schluessel rekursiv sortiert, keine Leerzeichen
///
/// Beide Seiten muessen dieselbe Byte-Folge erzeugen, unabhaengig von der
/// Feldreihenfolge im Quelltyp.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> CryptoResult<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&sortieren(value))?)
}

fn sortieren(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut eintraege: Vec<(String, Value)> = map.into_iter().collect();
            eintraege.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                eintraege
                    .into_iter()
                    .map(|(k, v)| (k, sortieren(v)))
                    .collect(),
            )
        }
        Value::Array(werte) => Value::Array(werte.into_iter().map(sortieren).collect()),
        andere => andere,
    }
}

/// Verschluesselt mit frischem IV, gibt (iv_b64, ciphertext_b64) zurueck
fn versiegeln(plaintext: &[u8], key_bytes: &[u8]) -> CryptoResult<(String, String)> {
    let iv = random_bytes::<IV_LEN>()?;
    let ciphertext = encrypt_aes256gcm(plaintext, key_bytes, &iv)?;
    Ok((bytes_to_base64(&iv), bytes_to_base64(&ciphertext)))
}

fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; IV_LEN],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != AES_KEY_LEN {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: AES_KEY_LEN,
            erhalten: key_bytes.len(),
        });
    }

    let key = Key::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Verschluesselung(format!("AES-256-GCM: {:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::TAG_LEN;
    use serde_json::json;
    use whisperlink_protocol::envelope::EnvelopeArt;

    fn test_key() -> Vec<u8> {
        vec![0x42u8; 32]
    }

    #[test]
    fn nachricht_hat_iv_und_tag() {
        let env = encrypt_message("hallo", &test_key()).unwrap();
        assert_eq!(env.art(), EnvelopeArt::Nachricht);
        assert_eq!(base64_to_bytes(env.iv()).unwrap().len(), IV_LEN);
        assert_eq!(base64_to_bytes(env.ciphertext()).unwrap().len(), 5 + TAG_LEN);
    }

    #[test]
    fn gleicher_klartext_verschiedene_ivs() {
        let a = encrypt_message("x", &test_key()).unwrap();
        let b = encrypt_message("x", &test_key()).unwrap();
        assert_ne!(a.iv(), b.iv());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn binaer_umschlag() {
        let env = encrypt_bytes(&[1, 2, 3], &test_key()).unwrap();
        assert_eq!(env.art(), EnvelopeArt::Binaer);
        assert_eq!(base64_to_bytes(env.ciphertext()).unwrap().len(), 3 + TAG_LEN);
    }

    #[test]
    fn leerer_klartext_ergibt_nur_tag() {
        let env = encrypt_message("", &test_key()).unwrap();
        assert_eq!(base64_to_bytes(env.ciphertext()).unwrap().len(), TAG_LEN);
    }

    #[test]
    fn falsche_schluessellaenge() {
        let err = encrypt_message("x", &[0u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, erhalten: 16 }
        ));
    }

    #[test]
    fn raw_verlangt_base64() {
        assert!(matches!(
            encrypt_raw("###", &test_key()),
            Err(CryptoError::UngueltigeDaten(_))
        ));
        assert!(encrypt_raw("AQID", &test_key()).is_ok());
    }

    #[test]
    fn kanonisches_json_sortiert_rekursiv() {
        let wert = json!({"b": 1, "a": {"z": true, "c": [ {"y": 1, "x": 2} ]}});
        assert_eq!(
            canonical_json(&wert).unwrap(),
            r#"{"a":{"c":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn kanonisches_json_fuer_structs() {
        #[derive(Serialize)]
        struct Rueckwaerts {
            zeta: u8,
            alpha: u8,
        }
        assert_eq!(
            canonical_json(&Rueckwaerts { zeta: 1, alpha: 2 }).unwrap(),
            r#"{"alpha":2,"zeta":1}"#
        );
    }
}
