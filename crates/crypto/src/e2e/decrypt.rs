//! AES-256-GCM Entschluesselung von Umschlaegen

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use whisperlink_protocol::EncryptedEnvelope;

use super::{AES_KEY_LEN, IV_LEN, TAG_LEN};
use crate::codec::{base64_to_bytes, bytes_to_base64, bytes_to_text};
use crate::error::{CryptoError, CryptoResult};

/// Entschluesselt einen Umschlag zu Text
///
/// Die Art des Umschlags wird nicht erzwungen; nur der Inhalt muss UTF-8 sein.
pub fn decrypt_message(envelope: &EncryptedEnvelope, key: &[u8]) -> CryptoResult<String> {
    bytes_to_text(&decrypt_bytes(envelope, key)?)
}

/// Entschluesselt einen Umschlag zu rohen Bytes
pub fn decrypt_bytes(envelope: &EncryptedEnvelope, key: &[u8]) -> CryptoResult<Vec<u8>> {
    let (iv, ciphertext) = zerlegen(envelope)?;
    decrypt_aes256gcm(&ciphertext, key, &iv)
}

/// Entschluesselt einen Umschlag und liefert die Bytes Base64-kodiert
pub fn decrypt_raw(envelope: &EncryptedEnvelope, key: &[u8]) -> CryptoResult<String> {
    Ok(bytes_to_base64(&decrypt_bytes(envelope, key)?))
}

fn zerlegen(envelope: &EncryptedEnvelope) -> CryptoResult<([u8; IV_LEN], Vec<u8>)> {
    if envelope.iv().is_empty() {
        return Err(CryptoError::UngueltigerUmschlag("IV fehlt".into()));
    }
    if envelope.ciphertext().is_empty() {
        return Err(CryptoError::UngueltigerUmschlag("Ciphertext fehlt".into()));
    }

    let iv_bytes = base64_to_bytes(envelope.iv())
        .map_err(|e| CryptoError::UngueltigerUmschlag(format!("IV: {}", e)))?;
    let iv: [u8; IV_LEN] = iv_bytes.as_slice().try_into().map_err(|_| {
        CryptoError::UngueltigerUmschlag(format!(
            "IV muss {} Bytes haben, hat {}",
            IV_LEN,
            iv_bytes.len()
        ))
    })?;

    let ciphertext = base64_to_bytes(envelope.ciphertext())
        .map_err(|e| CryptoError::UngueltigerUmschlag(format!("Ciphertext: {}", e)))?;
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::UngueltigerUmschlag(format!(
            "Ciphertext kuerzer als Auth-Tag ({} Bytes)",
            ciphertext.len()
        )));
    }

    Ok((iv, ciphertext))
}

fn decrypt_aes256gcm(
    ciphertext: &[u8],
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
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Entschluesselung("Auth-Tag ungueltig".into()))
}
