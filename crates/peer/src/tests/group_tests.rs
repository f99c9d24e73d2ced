//! Tests fuer den GroupKeyCoordinator (Einladender und Eingeladener)

use std::sync::Arc;

use tokio::sync::broadcast;
use whisperlink_core::{
    ConnectionStatus, MemoryPersistence, MemoryTransport, Payload, Persistence, Transport,
    TransportEvent,
};
use whisperlink_crypto::{EncryptionSession, SecretBytes};
use whisperlink_protocol::{
    Group, GroupInviteAccepted, GroupMember, GroupRole, GroupSettings, GroupType, PeerFrame,
};

use super::{AufzeichnenderHandler, Empfangen, TestConnector};
use crate::error::PeerError;
use crate::group::GroupKeyCoordinator;
use crate::group_store::GroupStore;
use crate::router::{classify_text, InboundFrame, MessageRouter};
use crate::system_message::SystemAction;

fn coordinator(
    peer_id: &str,
    name: &str,
    connector: Arc<TestConnector>,
    persistence: Arc<MemoryPersistence>,
) -> Arc<GroupKeyCoordinator> {
    let store = GroupStore::laden(persistence, "wl").expect("Store laden fehlgeschlagen");
    GroupKeyCoordinator::neu(peer_id, name, connector, store)
}

fn allein(peer_id: &str) -> Arc<GroupKeyCoordinator> {
    coordinator(
        peer_id,
        peer_id,
        TestConnector::mit(&[]),
        Arc::new(MemoryPersistence::new()),
    )
}

/// Fuehrt den 1:1-Handshake aus und hinterlegt den Schluessel auf beiden Seiten
fn sitzung(a: &GroupKeyCoordinator, b: &GroupKeyCoordinator) -> SecretBytes {
    let mut sa = EncryptionSession::new();
    let mut sb = EncryptionSession::new();
    let pa = sa.initialize().unwrap();
    let pb = sb.initialize().unwrap();
    sa.process_remote_public_key(&pb).unwrap();
    sb.process_remote_public_key(&pa).unwrap();

    let key = sa.shared_key().unwrap().clone();
    assert_eq!(&key, sb.shared_key().unwrap());
    a.register_session_key(b.local_peer_id(), key.clone());
    b.register_session_key(a.local_peer_id(), key.clone());
    key
}

/// Entschluesselt alle wartenden Nachrichten und stellt die Gruppen-Frames zu
async fn zustellen(
    rx: &mut broadcast::Receiver<TransportEvent>,
    ziel: &GroupKeyCoordinator,
    von: &Arc<MemoryTransport>,
    key: Option<&SecretBytes>,
) -> Vec<&'static str> {
    let router = MessageRouter::new();
    let handler = AufzeichnenderHandler::default();
    while let Ok(event) = rx.try_recv() {
        if let TransportEvent::Data(payload) = event {
            router.route(&payload, key, &handler).await;
        }
    }

    let mut typen = Vec::new();
    for empfangen in handler.alle() {
        let Empfangen::Gruppe(frame) = empfangen else {
            panic!("Kein Gruppen-Frame: {:?}", empfangen);
        };
        typen.push(frame.typ());
        ziel.handle_group_frame(von.clone(), frame)
            .await
            .expect("Gruppen-Frame fehlgeschlagen");
    }
    typen
}

fn gesendete_texte(transport: &MemoryTransport) -> Vec<String> {
    transport
        .gesendet()
        .into_iter()
        .filter_map(|p| match p {
            Payload::Text(t) => Some(t),
            Payload::Binary(_) => None,
        })
        .collect()
}

fn fremde_gruppe(id: &str, owner: &str, mitglieder: &[(&str, GroupRole)]) -> Group {
    Group {
        id: id.into(),
        name: "Fremd".into(),
        group_type: GroupType::Small,
        created_at: 0,
        owner: owner.into(),
        admins: Vec::new(),
        members: mitglieder
            .iter()
            .map(|(peer_id, role)| GroupMember {
                peer_id: peer_id.to_string(),
                joined_at: 0,
                role: *role,
                is_super_node: false,
                display_name: peer_id.to_string(),
            })
            .collect(),
        key_version: 1,
        settings: GroupSettings::default(),
    }
}

#[tokio::test]
async fn test_gruppe_mit_verschluesselung_anlegen() {
    let persistence = Arc::new(MemoryPersistence::new());
    let alice = coordinator("alice", "Alice", TestConnector::mit(&[]), persistence.clone());

    let group = alice
        .create_group(
            "T",
            GroupType::Small,
            GroupSettings {
                encryption_enabled: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(group.owner, "alice");
    assert_eq!(group.members.len(), 1);
    assert_eq!(group.members[0].role, GroupRole::Owner);
    assert!(group.members[0].is_super_node);
    assert_eq!(group.key_version, 1);
    assert_eq!(alice.keys().current_version(&group.id), Some(1));

    let json = persistence.get_item("wl_groups").unwrap().unwrap();
    assert!(json.contains(&group.id));
    assert!(!json.contains(&alice.group_key(&group.id).unwrap().key_base64));
}

#[tokio::test]
async fn test_gruppe_ohne_verschluesselung() {
    let alice = allein("alice");
    let group = alice
        .create_group(
            "Offen",
            GroupType::Large,
            GroupSettings {
                encryption_enabled: false,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(group.key_version, 0);
    assert!(!alice.keys().has_key(&group.id));
}

#[tokio::test]
async fn test_leerer_name() {
    let alice = allein("alice");
    assert!(matches!(
        alice.create_group("  ", GroupType::Small, GroupSettings::default()),
        Err(PeerError::UngueltigeEingabe(_))
    ));
}

#[tokio::test]
async fn test_einladen_fehlerfaelle() {
    let alice = allein("alice");

    assert!(matches!(
        alice.invite_member_to_group("fehlt", "bob").await,
        Err(PeerError::GruppeNichtGefunden(_))
    ));

    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    assert!(matches!(
        alice.invite_member_to_group(&group.id, "alice").await,
        Err(PeerError::BereitsMitglied { .. })
    ));

    // Ohne Endpunkt schlaegt der Verbindungsaufbau fehl
    assert!(matches!(
        alice.invite_member_to_group(&group.id, "bob").await,
        Err(PeerError::Core(_))
    ));

    // Einfaches Mitglied darf nicht einladen
    let fremd = fremde_gruppe("g-fremd", "zoe", &[("zoe", GroupRole::Owner), ("alice", GroupRole::Member)]);
    alice.store().speichern(fremd).unwrap();
    assert!(matches!(
        alice.invite_member_to_group("g-fremd", "bob").await,
        Err(PeerError::KeineBerechtigung(_))
    ));
}

#[tokio::test]
async fn test_annahme_ohne_einladung() {
    let alice = allein("alice");
    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    let transport = MemoryTransport::einzeln("mallory", ConnectionStatus::Connected);

    let err = alice
        .handle_group_invite_accepted(
            GroupInviteAccepted {
                group_id: group.id.clone(),
                peer_id: "mallory".into(),
                display_name: String::new(),
            },
            transport,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::EinladungNichtGefunden(_)));
    assert_eq!(alice.group(&group.id).unwrap().members.len(), 1);
}

#[tokio::test]
async fn test_annahme_unter_fremder_peer_id() {
    let (alice_bob, _bob_alice) = MemoryTransport::paar("alice", "bob");
    let (alice_mallory, _mallory_alice) = MemoryTransport::paar("alice", "mallory");
    let alice = coordinator(
        "alice",
        "Alice",
        TestConnector::mit(&[("bob", &alice_bob)]),
        Arc::new(MemoryPersistence::new()),
    );
    let bob = allein("bob");
    let mallory = allein("mallory");
    sitzung(&alice, &bob);
    sitzung(&alice, &mallory);

    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    alice.invite_member_to_group(&group.id, "bob").await.unwrap();

    let err = alice
        .handle_group_frame(
            alice_mallory.clone(),
            PeerFrame::GroupInviteAccepted(GroupInviteAccepted {
                group_id: group.id.clone(),
                peer_id: "bob".into(),
                display_name: "Bob".into(),
            }),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PeerError::KeineBerechtigung(_)));
    assert!(alice.pending_invite(&group.id, "bob").is_some());
    assert_eq!(alice.group(&group.id).unwrap().members.len(), 1);
    assert!(alice_mallory.gesendet().is_empty());
}

#[tokio::test]
async fn test_kein_schluessel_ohne_sitzung() {
    let (alice_bob, bob_alice) = MemoryTransport::paar("alice", "bob");
    let mut bob_eingang = bob_alice.subscribe();
    let alice = coordinator(
        "alice",
        "Alice",
        TestConnector::mit(&[("bob", &alice_bob)]),
        Arc::new(MemoryPersistence::new()),
    );
    let bob = coordinator(
        "bob",
        "Bob",
        TestConnector::mit(&[("alice", &bob_alice)]),
        Arc::new(MemoryPersistence::new()),
    );

    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    alice.invite_member_to_group(&group.id, "bob").await.unwrap();
    zustellen(&mut bob_eingang, &bob, &bob_alice, None).await;
    bob.accept_group_invite(&group.id).await.unwrap();

    let err = alice
        .handle_group_invite_accepted(
            GroupInviteAccepted {
                group_id: group.id.clone(),
                peer_id: "bob".into(),
                display_name: "Bob".into(),
            },
            alice_bob.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::KeineSitzung(ref peer) if peer == "bob"));
    assert!(alice.pending_invite(&group.id, "bob").is_some());
    assert_eq!(alice.group(&group.id).unwrap().members.len(), 1);

    let key = alice.group_key(&group.id).unwrap().key_base64.clone();
    assert!(gesendete_texte(&alice_bob).iter().all(|t| !t.contains(&key)));
}

#[tokio::test]
async fn test_kompletter_einladungsablauf() {
    let (alice_bob, bob_alice) = MemoryTransport::paar("alice", "bob");
    let (alice_carol, carol_alice) = MemoryTransport::paar("alice", "carol");
    let mut alice_von_bob = alice_bob.subscribe();
    let mut alice_von_carol = alice_carol.subscribe();
    let mut bob_eingang = bob_alice.subscribe();
    let mut carol_eingang = carol_alice.subscribe();

    let alice_persistenz = Arc::new(MemoryPersistence::new());
    let alice = coordinator(
        "alice",
        "Alice",
        TestConnector::mit(&[("bob", &alice_bob), ("carol", &alice_carol)]),
        alice_persistenz.clone(),
    );
    let bob = coordinator(
        "bob",
        "Bob",
        TestConnector::mit(&[("alice", &bob_alice)]),
        Arc::new(MemoryPersistence::new()),
    );
    let carol = coordinator(
        "carol",
        "Carol",
        TestConnector::mit(&[("alice", &carol_alice)]),
        Arc::new(MemoryPersistence::new()),
    );
    let ab = sitzung(&alice, &bob);
    let ac = sitzung(&alice, &carol);

    let group = alice
        .create_group("Team", GroupType::Small, GroupSettings::default())
        .unwrap();

    // Einladung an Bob
    alice.invite_member_to_group(&group.id, "bob").await.unwrap();
    assert!(alice.pending_invite(&group.id, "bob").is_some());
    assert_eq!(
        zustellen(&mut bob_eingang, &bob, &bob_alice, Some(&ab)).await,
        vec!["group-invite"]
    );
    assert_eq!(bob.received_invites().len(), 1);

    // Bob nimmt an, Alice nimmt auf und verteilt
    bob.accept_group_invite(&group.id).await.unwrap();
    assert!(bob.received_invites().is_empty());
    assert_eq!(
        zustellen(&mut alice_von_bob, &alice, &alice_bob, Some(&ab)).await,
        vec!["group-invite-accepted"]
    );
    assert!(alice.pending_invite(&group.id, "bob").is_none());
    assert_eq!(
        zustellen(&mut bob_eingang, &bob, &bob_alice, Some(&ab)).await,
        vec!["group-key-exchange-init", "group-key-distribution", "group-config"]
    );

    let bei_bob = bob.group(&group.id).expect("Bob kennt die Gruppe nicht");
    assert_eq!(bei_bob.members.len(), 2);
    assert_eq!(bei_bob.rolle("bob"), Some(GroupRole::Member));
    assert_eq!(
        bob.group_key(&group.id).unwrap().key,
        alice.group_key(&group.id).unwrap().key
    );

    // Gruppen-verschluesselte Nachricht von Alice an Bob
    let (version, env) = alice.encrypt_for_group(&group.id, "an alle").unwrap();
    assert_eq!(
        bob.decrypt_for_group(&group.id, version, &env).unwrap(),
        "an alle"
    );

    // Carol tritt bei, Bob wird benachrichtigt
    alice.invite_member_to_group(&group.id, "carol").await.unwrap();
    zustellen(&mut carol_eingang, &carol, &carol_alice, Some(&ac)).await;
    carol.accept_group_invite(&group.id).await.unwrap();
    zustellen(&mut alice_von_carol, &alice, &alice_carol, Some(&ac)).await;
    zustellen(&mut carol_eingang, &carol, &carol_alice, Some(&ac)).await;

    assert_eq!(
        zustellen(&mut bob_eingang, &bob, &bob_alice, Some(&ab)).await,
        vec!["group-member-joined"]
    );
    assert_eq!(bob.group(&group.id).unwrap().members.len(), 3);
    assert_eq!(carol.group(&group.id).unwrap().members.len(), 3);

    let texte: Vec<String> = bob
        .store()
        .nachrichten(&group.id)
        .iter()
        .map(|m| m.text())
        .collect();
    assert_eq!(texte, vec!["Carol ist der Gruppe beigetreten"]);

    let bei_alice = alice.store().nachrichten(&group.id);
    assert_eq!(bei_alice.len(), 2);
    assert!(bei_alice.iter().all(|m| m.action == SystemAction::MemberJoined));

    // Der Gruppenschluessel steht in keiner gesendeten Nachricht im Klartext
    let key = alice.group_key(&group.id).unwrap().key_base64.clone();
    for transport in [&alice_bob, &bob_alice, &alice_carol, &carol_alice] {
        for text in gesendete_texte(transport) {
            assert!(!text.contains(&key), "Schluessel im Klartext: {}", text);
            let InboundFrame::Frame(frame) = classify_text(&text) else {
                panic!("Kein Frame: {}", text);
            };
            assert_eq!(frame.typ(), "encrypted-message");
        }
    }

    // Neu laden: Roster ja, Schluessel nein
    let neu = coordinator(
        "alice",
        "Alice",
        TestConnector::mit(&[]),
        alice_persistenz,
    );
    assert_eq!(neu.group(&group.id).unwrap().members.len(), 3);
    assert!(!neu.keys().has_key(&group.id));
}

#[tokio::test]
async fn test_schluessel_erneuern() {
    let (alice_bob, bob_alice) = MemoryTransport::paar("alice", "bob");
    let mut alice_von_bob = alice_bob.subscribe();
    let mut bob_eingang = bob_alice.subscribe();
    let alice = coordinator(
        "alice",
        "Alice",
        TestConnector::mit(&[("bob", &alice_bob)]),
        Arc::new(MemoryPersistence::new()),
    );
    let bob = coordinator(
        "bob",
        "Bob",
        TestConnector::mit(&[("alice", &bob_alice)]),
        Arc::new(MemoryPersistence::new()),
    );
    let key = sitzung(&alice, &bob);

    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    alice.invite_member_to_group(&group.id, "bob").await.unwrap();
    zustellen(&mut bob_eingang, &bob, &bob_alice, Some(&key)).await;
    bob.accept_group_invite(&group.id).await.unwrap();
    zustellen(&mut alice_von_bob, &alice, &alice_bob, Some(&key)).await;
    zustellen(&mut bob_eingang, &bob, &bob_alice, Some(&key)).await;

    assert_eq!(alice.rotate_group_key(&group.id).await.unwrap(), 2);
    assert_eq!(alice.group(&group.id).unwrap().key_version, 2);
    assert_eq!(alice.group_key(&group.id).unwrap().version, 2);
    assert_eq!(
        alice.store().nachrichten(&group.id).last().unwrap().text(),
        "Gruppenschluessel aktualisiert (Version 2)"
    );

    assert_eq!(
        zustellen(&mut bob_eingang, &bob, &bob_alice, Some(&key)).await,
        vec!["group-key-exchange-init", "group-key-distribution"]
    );
    assert_eq!(bob.group(&group.id).unwrap().key_version, 2);
    assert_eq!(
        bob.group_key(&group.id).unwrap().key,
        alice.group_key(&group.id).unwrap().key
    );

    // Einfache Mitglieder duerfen nicht erneuern
    assert!(matches!(
        bob.rotate_group_key(&group.id).await,
        Err(PeerError::KeineBerechtigung(_))
    ));
    assert!(matches!(
        alice.rotate_group_key("fehlt").await,
        Err(PeerError::GruppeNichtGefunden(_))
    ));
}

#[tokio::test]
async fn test_aeltere_schluesselversion_wird_ignoriert() {
    let alice = allein("alice");
    let bob = allein("bob");
    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    let v1 = alice.group_key(&group.id).unwrap();
    alice.rotate_group_key(&group.id).await.unwrap();
    let v2 = alice.group_key(&group.id).unwrap();

    bob.store().speichern(alice.group(&group.id).unwrap()).unwrap();
    assert!(bob
        .handle_group_key_distribution("alice", &group.id, &v2.key_base64, 2)
        .unwrap());
    assert!(!bob
        .handle_group_key_distribution("alice", &group.id, &v1.key_base64, 1)
        .unwrap());

    assert_eq!(bob.keys().current_version(&group.id), Some(2));
    assert_eq!(bob.group(&group.id).unwrap().key_version, 2);
    assert_eq!(
        bob.store().nachrichten(&group.id)[0].text(),
        "Gruppenschluessel aktualisiert (Version 2)"
    );
}

#[tokio::test]
async fn test_besitzer_nimmt_keine_fremde_konfiguration_an() {
    let alice = allein("alice");
    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    let von_bob = MemoryTransport::einzeln("bob", ConnectionStatus::Connected);

    let mut gekapert = group.clone();
    gekapert.owner = "bob".into();
    gekapert.members[0].role = GroupRole::Member;
    let err = alice
        .handle_group_frame(
            von_bob.clone(),
            PeerFrame::GroupConfig {
                group_id: group.id.clone(),
                group_data: gekapert,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::KeineBerechtigung(_)));
    assert_eq!(alice.group(&group.id).unwrap().owner, "alice");

    let err = alice
        .handle_group_frame(
            von_bob,
            PeerFrame::GroupKeyDistribution {
                group_id: group.id.clone(),
                key_data: alice.group_key(&group.id).unwrap().key_base64.clone(),
                key_version: 9,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::KeineBerechtigung(_)));
    assert_eq!(alice.group_key(&group.id).unwrap().version, 1);
}

#[tokio::test]
async fn test_gruppendaten_nur_von_berechtigten() {
    let bob = allein("bob");

    // Ohne angenommene Einladung keine Konfiguration
    let fremd = fremde_gruppe("g", "zoe", &[("zoe", GroupRole::Owner), ("bob", GroupRole::Member)]);
    assert!(matches!(
        bob.handle_group_config("mallory", "g", fremd.clone()),
        Err(PeerError::KeineBerechtigung(_))
    ));
    assert!(bob.group("g").is_none());

    // Besitzer der gespeicherten Gruppe darf, einfache Mitglieder nicht
    let mut mit_carol = fremd.clone();
    mit_carol.members.push(GroupMember {
        peer_id: "carol".into(),
        joined_at: 0,
        role: GroupRole::Member,
        is_super_node: false,
        display_name: "Carol".into(),
    });
    bob.store().speichern(fremd).unwrap();
    assert!(matches!(
        bob.handle_group_config("carol", "g", mit_carol.clone()),
        Err(PeerError::KeineBerechtigung(_))
    ));
    assert!(matches!(
        bob.handle_group_member_joined("carol", "g", mit_carol.members[2].clone()),
        Err(PeerError::KeineBerechtigung(_))
    ));
    assert_eq!(bob.group("g").unwrap().members.len(), 2);

    bob.handle_group_config("zoe", "g", mit_carol).unwrap();
    assert_eq!(bob.group("g").unwrap().members.len(), 3);
}

#[tokio::test]
async fn test_einladung_bleibt_bei_fehlgeschlagener_aufnahme() {
    let (alice_bob, _bob_alice) = MemoryTransport::paar("alice", "bob");
    let alice = coordinator(
        "alice",
        "Alice",
        TestConnector::mit(&[("bob", &alice_bob)]),
        Arc::new(MemoryPersistence::new()),
    );
    let bob = allein("bob");
    sitzung(&alice, &bob);

    let group = alice
        .create_group("T", GroupType::Small, GroupSettings::default())
        .unwrap();
    alice.invite_member_to_group(&group.id, "bob").await.unwrap();

    // Bob ist inzwischen auf anderem Weg Mitglied geworden
    alice
        .store()
        .aktualisieren(&group.id, |g| {
            g.members.push(GroupMember {
                peer_id: "bob".into(),
                joined_at: 0,
                role: GroupRole::Member,
                is_super_node: false,
                display_name: "Bob".into(),
            });
            Ok(())
        })
        .unwrap();

    let err = alice
        .handle_group_invite_accepted(
            GroupInviteAccepted {
                group_id: group.id.clone(),
                peer_id: "bob".into(),
                display_name: "Bob".into(),
            },
            alice_bob.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::BereitsMitglied { .. }));
    assert!(alice.pending_invite(&group.id, "bob").is_some());
}

#[tokio::test]
async fn test_kein_gruppen_frame() {
    let alice = allein("alice");
    let transport = MemoryTransport::einzeln("bob", ConnectionStatus::Connected);
    let err = alice
        .handle_group_frame(
            transport,
            PeerFrame::EncryptionKey {
                public_key: "x".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PeerError::UngueltigeEingabe(_)));
}
