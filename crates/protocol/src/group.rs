//! Gruppen-Datenmodell
//!
//! Wird als `groupData` im `group-config`-Frame uebertragen und in dieser
//! Form auch persistiert. Schluesselmaterial ist bewusst kein Teil davon.

use serde::{Deserialize, Serialize};

/// Rolle eines Mitglieds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Owner,
    Admin,
    Member,
}

impl GroupRole {
    /// Darf andere Peers einladen
    pub fn darf_einladen(&self) -> bool {
        matches!(self, GroupRole::Owner | GroupRole::Admin)
    }
}

impl std::fmt::Display for GroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupRole::Owner => write!(f, "owner"),
            GroupRole::Admin => write!(f, "admin"),
            GroupRole::Member => write!(f, "member"),
        }
    }
}

/// Gruppentyp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    #[default]
    Small,
    Large,
}

impl std::str::FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Self::Small),
            "large" => Ok(Self::Large),
            other => Err(format!("Unbekannter Gruppentyp: '{}'", other)),
        }
    }
}

impl std::fmt::Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupType::Small => write!(f, "small"),
            GroupType::Large => write!(f, "large"),
        }
    }
}

/// Beitrittsmodus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Nur auf Einladung
    #[default]
    Invite,
    /// Beitrittsanfragen erlaubt
    Request,
}

/// Gruppen-Einstellungen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSettings {
    pub allow_files: bool,
    pub encryption_enabled: bool,
    pub join_mode: JoinMode,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            allow_files: true,
            encryption_enabled: true,
            join_mode: JoinMode::Invite,
        }
    }
}

/// Ein Mitglied einer Gruppe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub peer_id: String,
    /// Unix-Zeit in Millisekunden
    pub joined_at: i64,
    pub role: GroupRole,
    pub is_super_node: bool,
    pub display_name: String,
}

/// Gruppen-Datensatz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    /// Unix-Zeit in Millisekunden
    pub created_at: i64,
    /// Peer-ID des (einzigen) Besitzers
    pub owner: String,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    /// 0 = kein Gruppenschluessel, sonst aktuelle Schluessel-Version
    #[serde(default)]
    pub key_version: u32,
    #[serde(default)]
    pub settings: GroupSettings,
}

impl Group {
    pub fn mitglied(&self, peer_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.peer_id == peer_id)
    }

    pub fn ist_mitglied(&self, peer_id: &str) -> bool {
        self.mitglied(peer_id).is_some()
    }

    /// Rolle eines Peers; der Besitzer ist immer `Owner`
    pub fn rolle(&self, peer_id: &str) -> Option<GroupRole> {
        if self.owner == peer_id {
            return Some(GroupRole::Owner);
        }
        if self.admins.iter().any(|a| a == peer_id) {
            return Some(GroupRole::Admin);
        }
        self.mitglied(peer_id).map(|m| m.role)
    }

    /// Anzeigename eines Mitglieds, sonst die Peer-ID
    pub fn anzeigename<'a>(&'a self, peer_id: &'a str) -> &'a str {
        self.mitglied(peer_id)
            .map(|m| m.display_name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(peer_id)
    }
}
