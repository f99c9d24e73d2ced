//! System-Nachrichten einer Gruppe (Beitritt, Rollenwechsel, ...)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use whisperlink_protocol::{GroupMember, GroupRole};

/// Art der System-Nachricht
///
/// Auf dem Draht ein snake_case-String. Unbekannte Aktionen behalten ihren
/// Namen und werden unveraendert zurueckgeschrieben.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SystemAction {
    MemberJoined,
    MemberLeft,
    MemberRemoved,
    RoleChanged,
    SupernodeChanged,
    EncryptionChanged,
    KeyUpdated,
    GroupDisbanded,
    /// Unbekannte Aktion: `content` wird unveraendert angezeigt
    Unknown(String),
}

impl SystemAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MemberJoined => "member_joined",
            Self::MemberLeft => "member_left",
            Self::MemberRemoved => "member_removed",
            Self::RoleChanged => "role_changed",
            Self::SupernodeChanged => "supernode_changed",
            Self::EncryptionChanged => "encryption_changed",
            Self::KeyUpdated => "key_updated",
            Self::GroupDisbanded => "group_disbanded",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for SystemAction {
    fn from(name: String) -> Self {
        match name.as_str() {
            "member_joined" => Self::MemberJoined,
            "member_left" => Self::MemberLeft,
            "member_removed" => Self::MemberRemoved,
            "role_changed" => Self::RoleChanged,
            "supernode_changed" => Self::SupernodeChanged,
            "encryption_changed" => Self::EncryptionChanged,
            "key_updated" => Self::KeyUpdated,
            "group_disbanded" => Self::GroupDisbanded,
            _ => Self::Unknown(name),
        }
    }
}

impl From<SystemAction> for String {
    fn from(action: SystemAction) -> Self {
        match action {
            SystemAction::Unknown(name) => name,
            bekannt => bekannt.as_str().to_string(),
        }
    }
}

/// Eine System-Nachricht im Verlauf einer Gruppe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    pub id: String,
    pub group_id: String,
    pub action: SystemAction,
    /// Betroffener Peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_role: Option<GroupRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
    #[serde(default)]
    pub content: String,
    pub timestamp: i64,
}

impl SystemMessage {
    pub fn neu(group_id: &str, action: SystemAction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            action,
            target: None,
            target_name: None,
            new_role: None,
            enabled: None,
            key_version: None,
            content: String::new(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn member_joined(group_id: &str, member: &GroupMember) -> Self {
        Self {
            target: Some(member.peer_id.clone()),
            target_name: Some(member.display_name.clone()).filter(|n| !n.is_empty()),
            ..Self::neu(group_id, SystemAction::MemberJoined)
        }
    }

    pub fn key_updated(group_id: &str, version: u32) -> Self {
        Self {
            key_version: Some(version),
            ..Self::neu(group_id, SystemAction::KeyUpdated)
        }
    }

    /// Anzeigetext, siehe `format_system_message`
    pub fn text(&self) -> String {
        format_system_message(self)
    }
}

fn rollen_name(rolle: GroupRole) -> &'static str {
    match rolle {
        GroupRole::Owner => "Besitzer",
        GroupRole::Admin => "Admin",
        GroupRole::Member => "Mitglied",
    }
}

/// Eine Zeile Anzeigetext pro Aktion
pub fn format_system_message(msg: &SystemMessage) -> String {
    let name = msg
        .target_name
        .as_deref()
        .or(msg.target.as_deref())
        .unwrap_or("Unbekannt");

    match &msg.action {
        SystemAction::MemberJoined => format!("{} ist der Gruppe beigetreten", name),
        SystemAction::MemberLeft => format!("{} hat die Gruppe verlassen", name),
        SystemAction::MemberRemoved => format!("{} wurde aus der Gruppe entfernt", name),
        SystemAction::RoleChanged => match msg.new_role {
            Some(rolle) => format!("{} ist jetzt {}", name, rollen_name(rolle)),
            None => format!("Die Rolle von {} wurde geaendert", name),
        },
        SystemAction::SupernodeChanged => {
            if msg.enabled.unwrap_or(false) {
                format!("{} ist jetzt Super-Node", name)
            } else {
                format!("{} ist kein Super-Node mehr", name)
            }
        }
        SystemAction::EncryptionChanged => {
            if msg.enabled.unwrap_or(false) {
                "Verschluesselung aktiviert".to_string()
            } else {
                "Verschluesselung deaktiviert".to_string()
            }
        }
        SystemAction::KeyUpdated => match msg.key_version {
            Some(version) => format!("Gruppenschluessel aktualisiert (Version {})", version),
            None => "Gruppenschluessel aktualisiert".to_string(),
        },
        SystemAction::GroupDisbanded => "Die Gruppe wurde aufgeloest".to_string(),
        SystemAction::Unknown(_) => msg.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mit_ziel(action: SystemAction) -> SystemMessage {
        SystemMessage {
            target: Some("peer-7".into()),
            target_name: Some("Carol".into()),
            ..SystemMessage::neu("g", action)
        }
    }

    #[test]
    fn alle_aktionen() {
        assert_eq!(
            mit_ziel(SystemAction::MemberJoined).text(),
            "Carol ist der Gruppe beigetreten"
        );
        assert_eq!(
            mit_ziel(SystemAction::MemberLeft).text(),
            "Carol hat die Gruppe verlassen"
        );
        assert_eq!(
            mit_ziel(SystemAction::MemberRemoved).text(),
            "Carol wurde aus der Gruppe entfernt"
        );

        let mut rolle = mit_ziel(SystemAction::RoleChanged);
        rolle.new_role = Some(GroupRole::Admin);
        assert_eq!(rolle.text(), "Carol ist jetzt Admin");

        let mut node = mit_ziel(SystemAction::SupernodeChanged);
        node.enabled = Some(true);
        assert_eq!(node.text(), "Carol ist jetzt Super-Node");

        let mut krypto = SystemMessage::neu("g", SystemAction::EncryptionChanged);
        krypto.enabled = Some(false);
        assert_eq!(krypto.text(), "Verschluesselung deaktiviert");

        assert_eq!(
            SystemMessage::key_updated("g", 3).text(),
            "Gruppenschluessel aktualisiert (Version 3)"
        );
        assert_eq!(
            SystemMessage::neu("g", SystemAction::GroupDisbanded).text(),
            "Die Gruppe wurde aufgeloest"
        );
    }

    #[test]
    fn ohne_anzeigename_wird_peer_id_genutzt() {
        let mut msg = mit_ziel(SystemAction::MemberJoined);
        msg.target_name = None;
        assert_eq!(msg.text(), "peer-7 ist der Gruppe beigetreten");
    }

    #[test]
    fn unbekannte_aktion_zeigt_content() {
        let json = r#"{"id":"1","groupId":"g","action":"pinned","content":"Nachricht angeheftet","timestamp":0}"#;
        let msg: SystemMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.action, SystemAction::Unknown("pinned".into()));
        assert_eq!(format_system_message(&msg), "Nachricht angeheftet");
    }

    #[test]
    fn unbekannte_aktion_bleibt_beim_zurueckschreiben_erhalten() {
        let json = r#"{"id":"1","groupId":"g","action":"pinned","content":"x","timestamp":0}"#;
        let msg: SystemMessage = serde_json::from_str(json).unwrap();
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["action"], "pinned");

        let wieder: SystemMessage = serde_json::from_value(value).unwrap();
        assert_eq!(wieder, msg);
    }

    #[test]
    fn wire_format() {
        let value = serde_json::to_value(SystemMessage::key_updated("g", 2)).unwrap();
        assert_eq!(value["action"], "key_updated");
        assert_eq!(value["keyVersion"], 2);
        assert_eq!(value["groupId"], "g");
        assert!(value.get("target").is_none());
    }
}
