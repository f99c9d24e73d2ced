//! Binaer/Base64/Text-Konvertierungen
//!
//! Alle Base64-Werte auf der Leitung sind Standard-Base64 mit Padding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{CryptoError, CryptoResult};

pub fn bytes_to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn base64_to_bytes(encoded: &str) -> CryptoResult<Vec<u8>> {
    Ok(STANDARD.decode(encoded.trim())?)
}

pub fn text_to_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Dekodiert UTF-8; ungueltige Sequenzen sind ein Fehler, kein Ersatzzeichen
pub fn bytes_to_text(bytes: &[u8]) -> CryptoResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CryptoError::UngueltigeDaten(format!("Kein gueltiges UTF-8: {}", e)))
}

/// Kryptografisch sichere Zufalls-Bytes
///
/// Schlaegt mit `KryptoNichtVerfuegbar` fehl wenn das System keine
/// Zufallsquelle bereitstellt.
pub fn random_bytes<const N: usize>() -> CryptoResult<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CryptoError::KryptoNichtVerfuegbar("Keine Zufallsquelle".to_string()))?;
    Ok(buf)
}
