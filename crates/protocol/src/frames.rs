//! Peer-Frames
//!
//! Alle Text-Frames sind JSON-Objekte mit einem `type`-Feld. Die Werte
//! und Feldnamen (camelCase) sind fest, weil unabhaengige Implementierungen
//! miteinander sprechen muessen.
//!
//! ## Design
//! - Geschlossenes Tagged Enum statt dynamischem Dispatch auf `type`
//! - Unbekannte `type`-Werte sind kein Deserialisierungsfehler des Routers,
//!   sondern werden dort explizit als "unerkannt" behandelt
//!   (siehe `PeerFrame::ist_bekannter_typ`)

use serde::{Deserialize, Serialize};
use whisperlink_core::Payload;

use crate::envelope::EncryptedEnvelope;
use crate::group::{Group, GroupMember, GroupRole, GroupType};

// ---------------------------------------------------------------------------
// Datei-Frames
// ---------------------------------------------------------------------------

/// Metadaten einer Datei, einmal vor dem Chunk-Strom gesendet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub transfer_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub chunks_count: u32,
    /// Unix-Zeit in Millisekunden
    pub timestamp: i64,
}

/// Kopf eines Datei-Chunks
///
/// Im verschluesselten Pfad steht der Chunk als `encryptedData` im Kopf
/// (Text-Frame). Im unverschluesselten Pfad fehlt `encryptedData` und die
/// Rohdaten folgen dem Kopf im Binaer-Frame (siehe `wire`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHeader {
    pub transfer_id: String,
    /// Null-basiert, beim Sender monoton steigend
    pub chunk_index: u32,
    /// Nur ein Hinweis; Vollstaendigkeit ergibt sich aus `chunksCount`
    pub is_last_chunk: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<EncryptedEnvelope>,
}

// ---------------------------------------------------------------------------
// Gruppen-Frames
// ---------------------------------------------------------------------------

/// Einladung in eine Gruppe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInvite {
    pub group_id: String,
    pub group_name: String,
    pub group_type: GroupType,
    /// Peer-ID des Einladenden
    pub inviter: String,
    pub inviter_role: GroupRole,
    pub timestamp: i64,
}

/// Annahme einer Einladung (Eingeladener -> Einladender)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInviteAccepted {
    pub group_id: String,
    pub peer_id: String,
    #[serde(default)]
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// PeerFrame
// ---------------------------------------------------------------------------

/// Alle Text-Frames des Peer-Protokolls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PeerFrame {
    /// Oeffentlicher ECDH-Schluessel, loest `processRemotePublicKey` aus
    EncryptionKey { public_key: String },

    /// Verschluesselte Nachricht (Klartext kann selbst ein Frame sein)
    EncryptedMessage { iv: String, ciphertext: String },

    /// Verschluesselte Rohdaten
    EncryptedBinary { iv: String, encrypted_data: String },

    FileMetadata(FileMetadata),

    FileChunk(ChunkHeader),

    GroupInvite(GroupInvite),

    GroupInviteAccepted(GroupInviteAccepted),

    /// Vollstaendige Gruppen-Daten fuer ein neues Mitglied
    GroupConfig { group_id: String, group_data: Group },

    /// Kuendigt die Schluesselverteilung an
    GroupKeyExchangeInit { group_id: String },

    /// Gruppenschluessel (Base64) samt Version
    GroupKeyDistribution {
        group_id: String,
        key_data: String,
        key_version: u32,
    },

    /// Benachrichtigung an bestehende Mitglieder
    GroupMemberJoined { group_id: String, member: GroupMember },
}

impl PeerFrame {
    /// Alle `type`-Werte die dieses Enum kennt
    pub const BEKANNTE_TYPEN: &'static [&'static str] = &[
        "encryption-key",
        "encrypted-message",
        "encrypted-binary",
        "file-metadata",
        "file-chunk",
        "group-invite",
        "group-invite-accepted",
        "group-config",
        "group-key-exchange-init",
        "group-key-distribution",
        "group-member-joined",
    ];

    pub fn ist_bekannter_typ(typ: &str) -> bool {
        Self::BEKANNTE_TYPEN.contains(&typ)
    }

    /// Der `type`-Wert dieses Frames
    pub fn typ(&self) -> &'static str {
        match self {
            PeerFrame::EncryptionKey { .. } => "encryption-key",
            PeerFrame::EncryptedMessage { .. } => "encrypted-message",
            PeerFrame::EncryptedBinary { .. } => "encrypted-binary",
            PeerFrame::FileMetadata(_) => "file-metadata",
            PeerFrame::FileChunk(_) => "file-chunk",
            PeerFrame::GroupInvite(_) => "group-invite",
            PeerFrame::GroupInviteAccepted(_) => "group-invite-accepted",
            PeerFrame::GroupConfig { .. } => "group-config",
            PeerFrame::GroupKeyExchangeInit { .. } => "group-key-exchange-init",
            PeerFrame::GroupKeyDistribution { .. } => "group-key-distribution",
            PeerFrame::GroupMemberJoined { .. } => "group-member-joined",
        }
    }

    /// Gruppen-ID falls es ein Gruppen-Frame ist
    pub fn group_id(&self) -> Option<&str> {
        match self {
            PeerFrame::GroupInvite(invite) => Some(&invite.group_id),
            PeerFrame::GroupInviteAccepted(accepted) => Some(&accepted.group_id),
            PeerFrame::GroupConfig { group_id, .. }
            | PeerFrame::GroupKeyExchangeInit { group_id }
            | PeerFrame::GroupKeyDistribution { group_id, .. }
            | PeerFrame::GroupMemberJoined { group_id, .. } => Some(group_id),
            _ => None,
        }
    }

    /// Wandelt einen verschluesselten Frame in seinen Umschlag
    pub fn als_envelope(&self) -> Option<EncryptedEnvelope> {
        match self {
            PeerFrame::EncryptedMessage { iv, ciphertext } => {
                Some(EncryptedEnvelope::EncryptedMessage {
                    iv: iv.clone(),
                    ciphertext: ciphertext.clone(),
                })
            }
            PeerFrame::EncryptedBinary { iv, encrypted_data } => {
                Some(EncryptedEnvelope::EncryptedBinary {
                    iv: iv.clone(),
                    encrypted_data: encrypted_data.clone(),
                })
            }
            _ => None,
        }
    }

    /// Serialisiert den Frame als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert einen Frame aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Text-Payload fuer den Transport
    pub fn to_payload(&self) -> serde_json::Result<Payload> {
        self.to_json().map(Payload::Text)
    }
}

impl From<EncryptedEnvelope> for PeerFrame {
    fn from(envelope: EncryptedEnvelope) -> Self {
        match envelope {
            EncryptedEnvelope::EncryptedMessage { iv, ciphertext } => {
                PeerFrame::EncryptedMessage { iv, ciphertext }
            }
            EncryptedEnvelope::EncryptedBinary { iv, encrypted_data } => {
                PeerFrame::EncryptedBinary { iv, encrypted_data }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn als_value(frame: &PeerFrame) -> serde_json::Value {
        serde_json::from_str(&frame.to_json().unwrap()).unwrap()
    }

    #[test]
    fn encryption_key_wire_format() {
        let frame = PeerFrame::EncryptionKey {
            public_key: "QUJD".into(),
        };
        assert_eq!(
            als_value(&frame),
            json!({"type": "encryption-key", "publicKey": "QUJD"})
        );
    }

    #[test]
    fn file_metadata_wire_format() {
        let frame = PeerFrame::FileMetadata(FileMetadata {
            transfer_id: "t-1".into(),
            file_name: "bild.png".into(),
            file_type: "image/png".into(),
            file_size: 50_000,
            chunks_count: 4,
            timestamp: 1_700_000_000_000,
        });
        assert_eq!(
            als_value(&frame),
            json!({
                "type": "file-metadata",
                "transferId": "t-1",
                "fileName": "bild.png",
                "fileType": "image/png",
                "fileSize": 50000,
                "chunksCount": 4,
                "timestamp": 1700000000000i64
            })
        );
    }

    #[test]
    fn file_chunk_ohne_encrypted_data_laesst_feld_weg() {
        let frame = PeerFrame::FileChunk(ChunkHeader {
            transfer_id: "t-1".into(),
            chunk_index: 3,
            is_last_chunk: true,
            encrypted_data: None,
        });
        assert_eq!(
            als_value(&frame),
            json!({"type": "file-chunk", "transferId": "t-1", "chunkIndex": 3, "isLastChunk": true})
        );
    }

    #[test]
    fn file_chunk_mit_verschachteltem_umschlag() {
        let json = r#"{"type":"file-chunk","transferId":"t","chunkIndex":0,"isLastChunk":false,
            "encryptedData":{"type":"encrypted-binary","iv":"aXY=","encryptedData":"ZA=="}}"#;
        let frame = PeerFrame::from_json(json).unwrap();
        let PeerFrame::FileChunk(header) = frame else {
            panic!("Erwartet FileChunk");
        };
        assert_eq!(
            header.encrypted_data,
            Some(EncryptedEnvelope::EncryptedBinary {
                iv: "aXY=".into(),
                encrypted_data: "ZA==".into()
            })
        );
    }

    #[test]
    fn group_key_distribution_wire_format() {
        let frame = PeerFrame::GroupKeyDistribution {
            group_id: "g".into(),
            key_data: "a2V5".into(),
            key_version: 2,
        };
        assert_eq!(
            als_value(&frame),
            json!({"type": "group-key-distribution", "groupId": "g", "keyData": "a2V5", "keyVersion": 2})
        );
        assert_eq!(frame.group_id(), Some("g"));
    }

    #[test]
    fn group_invite_wire_format() {
        let frame = PeerFrame::GroupInvite(GroupInvite {
            group_id: "g".into(),
            group_name: "Team".into(),
            group_type: GroupType::Small,
            inviter: "alice".into(),
            inviter_role: GroupRole::Owner,
            timestamp: 1,
        });
        let value = als_value(&frame);
        assert_eq!(value["type"], "group-invite");
        assert_eq!(value["groupName"], "Team");
        assert_eq!(value["groupType"], "small");
        assert_eq!(value["inviterRole"], "owner");
    }

    #[test]
    fn typ_stimmt_mit_serialisierung_ueberein() {
        let frames = vec![
            PeerFrame::EncryptionKey { public_key: "x".into() },
            PeerFrame::EncryptedMessage { iv: "a".into(), ciphertext: "b".into() },
            PeerFrame::GroupKeyExchangeInit { group_id: "g".into() },
        ];
        for frame in frames {
            assert_eq!(als_value(&frame)["type"], frame.typ());
            assert!(PeerFrame::ist_bekannter_typ(frame.typ()));
        }
        assert!(!PeerFrame::ist_bekannter_typ("chat-message"));
    }

    #[test]
    fn envelope_konvertierung() {
        let env = EncryptedEnvelope::EncryptedMessage {
            iv: "aXY=".into(),
            ciphertext: "Y3Q=".into(),
        };
        let frame = PeerFrame::from(env.clone());
        assert_eq!(frame.typ(), "encrypted-message");
        assert_eq!(frame.als_envelope(), Some(env));
    }
}
