//! GroupKeyCoordinator – Gruppen anlegen, einladen, Schluessel verteilen
//!
//! ## Einladungs-Ablauf
//! ```text
//! Einladender                          Eingeladener
//!   invite_member_to_group  -- group-invite -->  handle_group_invite
//!                           <-- group-invite-accepted --  accept_group_invite
//!   handle_group_invite_accepted
//!     -- group-key-exchange-init -->
//!     -- group-key-distribution -->    handle_group_key_distribution
//!     -- group-config -->              handle_group_config
//!     -- group-member-joined --> (bestehende Mitglieder)
//! ```
//!
//! Gruppen-Frames werden mit dem Schluessel der 1:1-Sitzung zum Peer als
//! `encrypted-message` verschickt (`register_session_key`). Ohne Sitzung
//! wird kein Gruppenschluessel verteilt. Eingehende Gruppen-Frames werden
//! nur vom Einladenden oder von Besitzer/Admins der Gruppe akzeptiert.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use whisperlink_core::{PeerConnector, Transport};
use whisperlink_crypto::{encrypt_json, GroupKeyEntry, GroupKeyManager, SecretBytes};
use whisperlink_protocol::{
    EncryptedEnvelope, Group, GroupInvite, GroupInviteAccepted, GroupMember, GroupRole,
    GroupSettings, GroupType, PeerFrame,
};

use crate::error::{PeerError, PeerResult};
use crate::group_store::GroupStore;
use crate::queue::ConnectionQueue;
use crate::system_message::SystemMessage;

/// Eine versendete, noch nicht angenommene Einladung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvite {
    pub group_id: String,
    pub peer_id: String,
    pub invited_at: i64,
}

/// Koordiniert Gruppen, Einladungen und Gruppenschluessel eines Peers
pub struct GroupKeyCoordinator {
    local_peer_id: String,
    display_name: String,
    connector: Arc<dyn PeerConnector>,
    keys: GroupKeyManager,
    store: GroupStore,
    verbindungen: DashMap<String, Arc<ConnectionQueue>>,
    /// Session-Schluessel der 1:1-Verbindungen, nach Peer-ID
    sitzungen: DashMap<String, SecretBytes>,
    /// Schluessel: `(groupId, peerId)`
    versendete_einladungen: DashMap<(String, String), PendingInvite>,
    /// Schluessel: `groupId`
    empfangene_einladungen: DashMap<String, GroupInvite>,
    /// Angenommene Einladungen: `groupId` -> Einladender
    angenommene_einladungen: DashMap<String, String>,
}

impl std::fmt::Debug for GroupKeyCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeyCoordinator")
            .field("local_peer_id", &self.local_peer_id)
            .field("verbindungen", &self.verbindungen.len())
            .finish()
    }
}

fn jetzt_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn einladungs_key(group_id: &str, peer_id: &str) -> (String, String) {
    (group_id.to_string(), peer_id.to_string())
}

impl GroupKeyCoordinator {
    pub fn neu(
        local_peer_id: impl Into<String>,
        display_name: impl Into<String>,
        connector: Arc<dyn PeerConnector>,
        store: GroupStore,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_peer_id: local_peer_id.into(),
            display_name: display_name.into(),
            connector,
            keys: GroupKeyManager::new(),
            store,
            verbindungen: DashMap::new(),
            sitzungen: DashMap::new(),
            versendete_einladungen: DashMap::new(),
            empfangene_einladungen: DashMap::new(),
            angenommene_einladungen: DashMap::new(),
        })
    }

    pub fn local_peer_id(&self) -> &str {
        &self.local_peer_id
    }

    pub(crate) fn keys(&self) -> &GroupKeyManager {
        &self.keys
    }

    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    pub fn group(&self, group_id: &str) -> Option<Group> {
        self.store.get(group_id)
    }

    pub fn group_key(&self, group_id: &str) -> Option<Arc<GroupKeyEntry>> {
        self.keys.get(group_id)
    }

    /// Verschluesselt mit dem aktuellen Gruppenschluessel, liefert (Version, Umschlag)
    pub fn encrypt_for_group(
        &self,
        group_id: &str,
        plaintext: &str,
    ) -> PeerResult<(u32, EncryptedEnvelope)> {
        Ok(self.keys.encrypt_for_group(group_id, plaintext)?)
    }

    pub fn decrypt_for_group(
        &self,
        group_id: &str,
        version: u32,
        envelope: &EncryptedEnvelope,
    ) -> PeerResult<String> {
        Ok(self.keys.decrypt_for_group(group_id, version, envelope)?)
    }

    // -----------------------------------------------------------------------
    // Verbindungen
    // -----------------------------------------------------------------------

    /// Registriert eine bestehende Verbindung zu einem Peer
    ///
    /// Startet den Task der die Warteschlange bei `open` leert; muss daher
    /// innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn register_connection(&self, transport: Arc<dyn Transport>) -> Arc<ConnectionQueue> {
        let peer_id = transport.remote_peer_id().to_string();
        if let Some(vorhanden) = self.verbindungen.get(&peer_id) {
            if Arc::ptr_eq(vorhanden.transport(), &transport) {
                return Arc::clone(vorhanden.value());
            }
        }

        let queue = ConnectionQueue::neu(transport);
        queue.spawn_flush_on_open();
        self.verbindungen.insert(peer_id.clone(), Arc::clone(&queue));
        tracing::debug!(peer = %peer_id, "Verbindung registriert");
        queue
    }

    pub fn connection(&self, peer_id: &str) -> Option<Arc<ConnectionQueue>> {
        self.verbindungen.get(peer_id).map(|q| Arc::clone(q.value()))
    }

    /// Hinterlegt den Schluessel der fertigen 1:1-Sitzung zu einem Peer
    pub fn register_session_key(&self, peer_id: &str, key: SecretBytes) {
        self.sitzungen.insert(peer_id.to_string(), key);
        tracing::debug!(peer = peer_id, "Session-Schluessel hinterlegt");
    }

    /// Nach `reset()` der Sitzung aufrufen
    pub fn remove_session_key(&self, peer_id: &str) -> bool {
        self.sitzungen.remove(peer_id).is_some()
    }

    /// Sendet einen Gruppen-Frame, verschluesselt wenn eine Sitzung besteht
    ///
    /// `group-key-distribution` verlangt eine Sitzung.
    async fn gruppen_frame_senden(
        &self,
        queue: &ConnectionQueue,
        frame: &PeerFrame,
    ) -> PeerResult<()> {
        let key = self.sitzungen.get(queue.peer_id()).map(|k| k.value().clone());
        match key {
            Some(key) => {
                let envelope = encrypt_json(frame, key.as_bytes())?;
                queue.send_frame(&PeerFrame::from(envelope)).await?;
            }
            None if matches!(frame, PeerFrame::GroupKeyDistribution { .. }) => {
                return Err(PeerError::KeineSitzung(queue.peer_id().to_string()));
            }
            None => {
                queue.send_frame(frame).await?;
            }
        }
        Ok(())
    }

    /// Vorhandene Verbindung oder neu ueber den Connector
    async fn verbindung(&self, peer_id: &str) -> PeerResult<Arc<ConnectionQueue>> {
        if let Some(queue) = self.connection(peer_id) {
            return Ok(queue);
        }
        let transport = self.connector.connect(peer_id).await?;
        Ok(self.register_connection(transport))
    }

    // -----------------------------------------------------------------------
    // Einladender / Besitzer
    // -----------------------------------------------------------------------

    /// Legt eine Gruppe an; der lokale Peer ist einziger Besitzer und Super-Node
    pub fn create_group(
        &self,
        name: &str,
        group_type: GroupType,
        settings: GroupSettings,
    ) -> PeerResult<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PeerError::UngueltigeEingabe(
                "Gruppenname darf nicht leer sein".into(),
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let jetzt = jetzt_ms();
        let key_version = if settings.encryption_enabled {
            self.keys.create_group_key(&id)?.version
        } else {
            0
        };

        let group = Group {
            id: id.clone(),
            name: name.to_string(),
            group_type,
            created_at: jetzt,
            owner: self.local_peer_id.clone(),
            admins: Vec::new(),
            members: vec![GroupMember {
                peer_id: self.local_peer_id.clone(),
                joined_at: jetzt,
                role: GroupRole::Owner,
                is_super_node: true,
                display_name: self.display_name.clone(),
            }],
            key_version,
            settings,
        };

        if let Err(e) = self.store.speichern(group.clone()) {
            self.keys.remove_group(&id);
            return Err(e);
        }

        tracing::info!(
            group_id = %id,
            name = %group.name,
            typ = %group.group_type,
            key_version,
            "Gruppe angelegt"
        );
        Ok(group)
    }

    /// Laedt einen Peer in eine Gruppe ein (nur Besitzer und Admins)
    pub async fn invite_member_to_group(&self, group_id: &str, target_peer_id: &str) -> PeerResult<()> {
        let group = self
            .store
            .get(group_id)
            .ok_or_else(|| PeerError::GruppeNichtGefunden(group_id.to_string()))?;

        let rolle = group
            .rolle(&self.local_peer_id)
            .filter(GroupRole::darf_einladen)
            .ok_or_else(|| {
                PeerError::KeineBerechtigung(format!(
                    "{} darf in {} nicht einladen",
                    self.local_peer_id, group_id
                ))
            })?;

        if group.ist_mitglied(target_peer_id) {
            return Err(PeerError::BereitsMitglied {
                group_id: group_id.to_string(),
                peer_id: target_peer_id.to_string(),
            });
        }

        let queue = self.verbindung(target_peer_id).await?;
        let jetzt = jetzt_ms();
        let frame = PeerFrame::GroupInvite(GroupInvite {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            group_type: group.group_type,
            inviter: self.local_peer_id.clone(),
            inviter_role: rolle,
            timestamp: jetzt,
        });
        self.gruppen_frame_senden(&queue, &frame).await?;

        self.versendete_einladungen.insert(
            einladungs_key(group_id, target_peer_id),
            PendingInvite {
                group_id: group_id.to_string(),
                peer_id: target_peer_id.to_string(),
                invited_at: jetzt,
            },
        );

        tracing::info!(
            group_id,
            peer = target_peer_id,
            ausstehend = queue.pending_count(),
            "Einladung versendet"
        );
        Ok(())
    }

    pub fn pending_invite(&self, group_id: &str, peer_id: &str) -> Option<PendingInvite> {
        self.versendete_einladungen
            .get(&einladungs_key(group_id, peer_id))
            .map(|e| e.value().clone())
    }

    /// Nimmt ein neues Mitglied auf, nachdem es die Einladung angenommen hat
    pub async fn handle_group_invite_accepted(
        &self,
        accepted: GroupInviteAccepted,
        transport: Arc<dyn Transport>,
    ) -> PeerResult<Group> {
        let group_id = accepted.group_id.as_str();
        let member_id = accepted.peer_id.as_str();

        if transport.remote_peer_id() != member_id {
            return Err(PeerError::KeineBerechtigung(format!(
                "{} nimmt die Einladung von {} an",
                transport.remote_peer_id(),
                member_id
            )));
        }
        let einladung = einladungs_key(group_id, member_id);
        if !self.versendete_einladungen.contains_key(&einladung) {
            return Err(PeerError::EinladungNichtGefunden(format!(
                "{} fuer {}",
                group_id, member_id
            )));
        }
        let verschluesselt = self
            .store
            .get(group_id)
            .ok_or_else(|| PeerError::GruppeNichtGefunden(group_id.to_string()))?
            .settings
            .encryption_enabled;
        if verschluesselt && !self.sitzungen.contains_key(member_id) {
            return Err(PeerError::KeineSitzung(member_id.to_string()));
        }

        let member = GroupMember {
            peer_id: member_id.to_string(),
            joined_at: jetzt_ms(),
            role: GroupRole::Member,
            is_super_node: false,
            display_name: accepted.display_name.clone(),
        };
        let group = self.store.aktualisieren(group_id, |g| {
            if g.ist_mitglied(member_id) {
                return Err(PeerError::BereitsMitglied {
                    group_id: group_id.to_string(),
                    peer_id: member_id.to_string(),
                });
            }
            g.members.push(member.clone());
            Ok(())
        })?;
        self.versendete_einladungen.remove(&einladung);

        let queue = self.register_connection(transport);

        if group.settings.encryption_enabled {
            self.distribute_group_key(group_id, &queue).await?;
        }

        self.gruppen_frame_senden(
            &queue,
            &PeerFrame::GroupConfig {
                group_id: group.id.clone(),
                group_data: group.clone(),
            },
        )
        .await?;

        self.mitglieder_benachrichtigen(&group, &member).await;
        self.store
            .nachricht_anhaengen(SystemMessage::member_joined(group_id, &member))?;

        tracing::info!(
            group_id,
            peer = member_id,
            mitglieder = group.members.len(),
            "Mitglied aufgenommen"
        );
        Ok(group)
    }

    /// Sendet `group-member-joined` an alle verbundenen Bestandsmitglieder
    async fn mitglieder_benachrichtigen(&self, group: &Group, neu: &GroupMember) {
        let frame = PeerFrame::GroupMemberJoined {
            group_id: group.id.clone(),
            member: neu.clone(),
        };
        let empfaenger: Vec<Arc<ConnectionQueue>> = group
            .members
            .iter()
            .filter(|m| m.peer_id != self.local_peer_id && m.peer_id != neu.peer_id)
            .filter_map(|m| self.connection(&m.peer_id))
            .collect();

        for queue in empfaenger {
            if let Err(e) = self.gruppen_frame_senden(&queue, &frame).await {
                tracing::warn!(
                    group_id = %group.id,
                    peer = %queue.peer_id(),
                    fehler = %e,
                    "group-member-joined nicht zugestellt"
                );
            }
        }
    }

    /// Sendet den aktuellen Gruppenschluessel an einen Peer
    ///
    /// Erst `group-key-exchange-init`, dann `group-key-distribution`.
    pub async fn distribute_group_key(&self, group_id: &str, queue: &ConnectionQueue) -> PeerResult<()> {
        let key = self.keys.get_group_key(group_id)?;
        if !self.sitzungen.contains_key(queue.peer_id()) {
            return Err(PeerError::KeineSitzung(queue.peer_id().to_string()));
        }

        self.gruppen_frame_senden(
            queue,
            &PeerFrame::GroupKeyExchangeInit {
                group_id: group_id.to_string(),
            },
        )
        .await?;
        self.gruppen_frame_senden(
            queue,
            &PeerFrame::GroupKeyDistribution {
                group_id: group_id.to_string(),
                key_data: key.key_base64.clone(),
                key_version: key.version,
            },
        )
        .await?;

        tracing::debug!(
            group_id,
            peer = %queue.peer_id(),
            version = key.version,
            "Gruppenschluessel verteilt"
        );
        Ok(())
    }

    /// Erneuert den Gruppenschluessel (nur Besitzer und Admins)
    ///
    /// `key_version` der Gruppe wird im selben Schritt erhoeht. Der neue
    /// Schluessel geht an alle verbundenen Mitglieder mit Sitzung; Fehler
    /// dabei werden nur geloggt.
    pub async fn rotate_group_key(&self, group_id: &str) -> PeerResult<u32> {
        let group = self
            .store
            .get(group_id)
            .ok_or_else(|| PeerError::GruppeNichtGefunden(group_id.to_string()))?;
        if !group
            .rolle(&self.local_peer_id)
            .is_some_and(|r| r.darf_einladen())
        {
            return Err(PeerError::KeineBerechtigung(format!(
                "{} darf den Schluessel von {} nicht erneuern",
                self.local_peer_id, group_id
            )));
        }

        let group = self.store.aktualisieren(group_id, |g| {
            let neu = self.keys.rotate_key(group_id)?;
            g.key_version = neu.version;
            Ok(())
        })?;
        self.store
            .nachricht_anhaengen(SystemMessage::key_updated(group_id, group.key_version))?;

        let empfaenger: Vec<Arc<ConnectionQueue>> = group
            .members
            .iter()
            .filter(|m| m.peer_id != self.local_peer_id)
            .filter_map(|m| self.connection(&m.peer_id))
            .collect();
        for queue in empfaenger {
            if let Err(e) = self.distribute_group_key(group_id, &queue).await {
                tracing::warn!(
                    group_id,
                    peer = %queue.peer_id(),
                    fehler = %e,
                    "Erneuerter Gruppenschluessel nicht zugestellt"
                );
            }
        }

        tracing::info!(group_id, version = group.key_version, "Gruppenschluessel erneuert");
        Ok(group.key_version)
    }

    // -----------------------------------------------------------------------
    // Eingeladener / Mitglied
    // -----------------------------------------------------------------------

    /// Prueft ob `absender` Gruppen-Daten fuer `group_id` schicken darf
    ///
    /// Erlaubt sind der Peer dessen Einladung wir angenommen haben sowie
    /// Besitzer und Admins der gespeicherten Gruppe. Fuer eigene Gruppen
    /// nimmt der Besitzer nichts an.
    fn absender_pruefen(&self, absender: &str, group_id: &str) -> PeerResult<()> {
        if let Some(group) = self.store.get(group_id) {
            if group.owner == self.local_peer_id {
                return Err(PeerError::KeineBerechtigung(format!(
                    "{} ist Besitzer von {}, Daten von {} abgelehnt",
                    self.local_peer_id, group_id, absender
                )));
            }
            if group.rolle(absender).is_some_and(|r| r.darf_einladen()) {
                return Ok(());
            }
        }
        let eingeladen_von = self
            .angenommene_einladungen
            .get(group_id)
            .is_some_and(|e| e.value() == absender);
        if eingeladen_von {
            return Ok(());
        }
        Err(PeerError::KeineBerechtigung(format!(
            "{} darf keine Daten fuer {} senden",
            absender, group_id
        )))
    }

    /// Merkt sich eine empfangene Einladung
    pub fn handle_group_invite(&self, invite: GroupInvite) {
        tracing::info!(
            group_id = %invite.group_id,
            von = %invite.inviter,
            "Einladung empfangen"
        );
        self.empfangene_einladungen
            .insert(invite.group_id.clone(), invite);
    }

    /// Offene empfangene Einladungen
    pub fn received_invites(&self) -> Vec<GroupInvite> {
        self.empfangene_einladungen
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    /// Nimmt eine empfangene Einladung an
    pub async fn accept_group_invite(&self, group_id: &str) -> PeerResult<()> {
        let (_, invite) = self
            .empfangene_einladungen
            .remove(group_id)
            .ok_or_else(|| PeerError::EinladungNichtGefunden(group_id.to_string()))?;

        let queue = self.verbindung(&invite.inviter).await?;
        self.gruppen_frame_senden(
            &queue,
            &PeerFrame::GroupInviteAccepted(GroupInviteAccepted {
                group_id: invite.group_id.clone(),
                peer_id: self.local_peer_id.clone(),
                display_name: self.display_name.clone(),
            }),
        )
        .await?;
        self.angenommene_einladungen
            .insert(invite.group_id.clone(), invite.inviter.clone());

        tracing::info!(group_id, an = %invite.inviter, "Einladung angenommen");
        Ok(())
    }

    /// Uebernimmt die vollstaendigen Gruppen-Daten
    pub fn handle_group_config(
        &self,
        absender: &str,
        group_id: &str,
        group_data: Group,
    ) -> PeerResult<()> {
        self.absender_pruefen(absender, group_id)?;
        if group_data.id != group_id {
            return Err(PeerError::UngueltigeEingabe(format!(
                "group-config fuer {} enthaelt Gruppe {}",
                group_id, group_data.id
            )));
        }
        tracing::info!(
            group_id,
            mitglieder = group_data.members.len(),
            "Gruppen-Konfiguration uebernommen"
        );
        self.store.speichern(group_data)?;
        self.angenommene_einladungen.remove(group_id);
        Ok(())
    }

    /// Importiert einen verteilten Gruppenschluessel (nur hoehere Versionen)
    pub fn handle_group_key_distribution(
        &self,
        absender: &str,
        group_id: &str,
        key_data: &str,
        key_version: u32,
    ) -> PeerResult<bool> {
        self.absender_pruefen(absender, group_id)?;
        let uebernommen = self.keys.import_key(group_id, key_data, key_version)?;
        if uebernommen && self.store.enthaelt(group_id) {
            self.store.aktualisieren(group_id, |g| {
                g.key_version = g.key_version.max(key_version);
                Ok(())
            })?;
            if key_version > 1 {
                self.store
                    .nachricht_anhaengen(SystemMessage::key_updated(group_id, key_version))?;
            }
        }
        Ok(uebernommen)
    }

    /// Traegt ein neues Mitglied in den lokalen Roster ein
    pub fn handle_group_member_joined(
        &self,
        absender: &str,
        group_id: &str,
        member: GroupMember,
    ) -> PeerResult<()> {
        self.absender_pruefen(absender, group_id)?;
        let mut neu = false;
        self.store.aktualisieren(group_id, |g| {
            if !g.ist_mitglied(&member.peer_id) {
                g.members.push(member.clone());
                neu = true;
            }
            Ok(())
        })?;

        if neu {
            self.store
                .nachricht_anhaengen(SystemMessage::member_joined(group_id, &member))?;
        }
        Ok(())
    }

    /// Verteilt einen eingehenden Gruppen-Frame
    pub async fn handle_group_frame(&self, from: Arc<dyn Transport>, frame: PeerFrame) -> PeerResult<()> {
        match frame {
            PeerFrame::GroupInvite(invite) => {
                self.register_connection(from);
                self.handle_group_invite(invite);
                Ok(())
            }
            PeerFrame::GroupInviteAccepted(accepted) => {
                self.handle_group_invite_accepted(accepted, from)
                    .await
                    .map(|_| ())
            }
            PeerFrame::GroupConfig {
                group_id,
                group_data,
            } => self.handle_group_config(from.remote_peer_id(), &group_id, group_data),
            PeerFrame::GroupKeyExchangeInit { group_id } => {
                tracing::debug!(group_id = %group_id, von = %from.remote_peer_id(), "Schluesselverteilung angekuendigt");
                Ok(())
            }
            PeerFrame::GroupKeyDistribution {
                group_id,
                key_data,
                key_version,
            } => self
                .handle_group_key_distribution(
                    from.remote_peer_id(),
                    &group_id,
                    &key_data,
                    key_version,
                )
                .map(|_| ()),
            PeerFrame::GroupMemberJoined { group_id, member } => {
                self.handle_group_member_joined(from.remote_peer_id(), &group_id, member)
            }
            andere => Err(PeerError::UngueltigeEingabe(format!(
                "{} ist kein Gruppen-Frame",
                andere.typ()
            ))),
        }
    }
}
