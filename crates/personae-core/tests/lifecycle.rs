//! End-to-end character lifecycle tests.
//!
//! Every test runs against real files in a temporary directory: the
//! identity index, one file per character, and one file per player.

// Integration tests use unwrap extensively for clarity -- panicking on
// failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::too_many_lines
)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use personae_core::{
    AdminCommand, BarrierTicket, CoordinatorError, ErrorKind, FeatureModule, PeerSync,
    PersonaeConfig, SwitchCoordinator, SwitchEvent, SwitchPhase, SwitchReason,
};
use personae_core::module::{CreateEvent, DeleteEvent};
use personae_db::{CharacterStore, PlayerStateStore};
use personae_registry::IdentityRegistry;
use personae_types::{CharacterId, CharacterRecord, CharacterSetSync, DataBag, PlayerId};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Seen {
    Create(CharacterId),
    Pre(SwitchEvent),
    Post(SwitchEvent),
    Delete(CharacterId),
}

/// Records every callback and writes markers into its own namespace.
#[derive(Default)]
struct Journal {
    seen: Mutex<Vec<Seen>>,
}

impl Journal {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }
}

impl FeatureModule for Journal {
    fn name(&self) -> &str {
        "journal"
    }

    fn on_create(&self, event: &CreateEvent, record: &mut CharacterRecord) {
        self.seen.lock().push(Seen::Create(event.character_id));
        record.data_mut().namespace_mut("journal")["created"] = json!(true);
    }

    fn on_pre_switch(
        &self,
        event: &SwitchEvent,
        outgoing: Option<&mut CharacterRecord>,
        ticket: BarrierTicket,
    ) {
        self.seen.lock().push(Seen::Pre(*event));
        if let Some(record) = outgoing {
            record.data_mut().namespace_mut("journal")["saved"] = json!(true);
        }
        ticket.complete();
    }

    fn on_switch(&self, event: &SwitchEvent, incoming: Option<&mut CharacterRecord>) {
        self.seen.lock().push(Seen::Post(*event));
        if let Some(record) = incoming {
            record.data_mut().namespace_mut("journal")["loaded"] = json!(true);
        }
    }

    fn on_delete(&self, event: &DeleteEvent, _record: &CharacterRecord) {
        self.seen.lock().push(Seen::Delete(event.character_id));
    }
}

/// Refuses every deletion.
struct Bank;

impl FeatureModule for Bank {
    fn name(&self) -> &str {
        "bank"
    }

    fn check_delete(&self, _event: &DeleteEvent, _record: &CharacterRecord) -> Result<(), String> {
        Err("vault is not empty".to_owned())
    }
}

/// Hands its pre-switch tickets to the test instead of completing them.
struct Slow {
    tickets: mpsc::UnboundedSender<BarrierTicket>,
}

impl FeatureModule for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn on_pre_switch(
        &self,
        _event: &SwitchEvent,
        _outgoing: Option<&mut CharacterRecord>,
        ticket: BarrierTicket,
    ) {
        let _ = self.tickets.send(ticket);
    }
}

/// Keeps every ticket forever.
#[derive(Default)]
struct Stuck {
    held: Mutex<Vec<BarrierTicket>>,
}

impl FeatureModule for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    fn on_pre_switch(
        &self,
        _event: &SwitchEvent,
        _outgoing: Option<&mut CharacterRecord>,
        ticket: BarrierTicket,
    ) {
        self.held.lock().push(ticket);
    }
}

#[derive(Default)]
struct RecordingPeer {
    pushes: Mutex<Vec<(PlayerId, CharacterSetSync)>>,
}

impl PeerSync for RecordingPeer {
    fn push_state(&self, state: &CharacterSetSync, destination: PlayerId) {
        self.pushes.lock().push((destination, state.clone()));
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    dir: TempDir,
    registry: Arc<IdentityRegistry>,
    store: Arc<CharacterStore>,
    players: Arc<PlayerStateStore>,
    peer: Arc<RecordingPeer>,
    coordinator: Arc<SwitchCoordinator>,
}

fn config(cooldown_secs: u64) -> PersonaeConfig {
    let mut config = PersonaeConfig::default();
    config.characters.switch_cooldown_secs = cooldown_secs;
    config.characters.barrier_timeout_ms = 1_000;
    config
}

fn build(dir: TempDir, config: &PersonaeConfig, modules: Vec<Arc<dyn FeatureModule>>) -> Harness {
    let registry = Arc::new(IdentityRegistry::open(dir.path().join("character-index.dat")));
    let store = Arc::new(CharacterStore::open(dir.path().join("characters")).unwrap());
    let players = Arc::new(PlayerStateStore::open(dir.path().join("players")).unwrap());
    let peer = Arc::new(RecordingPeer::default());
    let peer_sync: Arc<dyn PeerSync> = Arc::clone(&peer) as Arc<dyn PeerSync>;

    let mut coordinator = SwitchCoordinator::new(
        config,
        Arc::clone(&registry),
        Arc::clone(&store),
        Arc::clone(&players),
        peer_sync,
    )
    .unwrap();
    for module in modules {
        coordinator.register_module(module);
    }

    Harness {
        dir,
        registry,
        store,
        players,
        peer,
        coordinator: Arc::new(coordinator),
    }
}

fn harness(config: &PersonaeConfig, modules: Vec<Arc<dyn FeatureModule>>) -> Harness {
    build(tempfile::tempdir().unwrap(), config, modules)
}

async fn active_id(coordinator: &SwitchCoordinator, player: PlayerId) -> Option<CharacterId> {
    coordinator
        .active_character(player)
        .await
        .unwrap()
        .map(|record| record.id())
}

fn switch(player: PlayerId, from: Option<CharacterId>, to: Option<CharacterId>, reason: SwitchReason) -> SwitchEvent {
    SwitchEvent {
        player,
        from,
        to,
        reason,
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn aria_and_nyx_full_lifecycle() {
    let journal = Arc::new(Journal::default());
    let h = harness(&config(0), vec![Arc::clone(&journal) as Arc<dyn FeatureModule>]);
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;

    // First character becomes active.
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    assert_eq!(active_id(c, player).await, Some(aria.id()));
    assert_eq!(
        aria.data().get("journal"),
        Some(&json!({"created": true, "loaded": true}))
    );

    // Second character does not change the active one.
    let nyx = c.create_character(player, "Nyx", DataBag::new()).await.unwrap();
    assert_eq!(active_id(c, player).await, Some(aria.id()));

    // Switch: pre-switch then post-switch, outgoing saved, incoming loaded.
    c.switch_character(player, "nyx").await.unwrap();
    assert_eq!(active_id(c, player).await, Some(nyx.id()));
    assert_eq!(
        journal.seen(),
        vec![
            Seen::Create(aria.id()),
            Seen::Pre(switch(player, None, Some(aria.id()), SwitchReason::FirstCharacter)),
            Seen::Post(switch(player, None, Some(aria.id()), SwitchReason::FirstCharacter)),
            Seen::Create(nyx.id()),
            Seen::Pre(switch(player, Some(aria.id()), Some(nyx.id()), SwitchReason::Requested)),
            Seen::Post(switch(player, Some(aria.id()), Some(nyx.id()), SwitchReason::Requested)),
        ]
    );
    h.store.clear_cache();
    let stored_aria = h.store.load(aria.id()).unwrap();
    assert_eq!(stored_aria.data().get("journal").unwrap()["saved"], json!(true));
    let stored_nyx = h.store.load(nyx.id()).unwrap();
    assert_eq!(stored_nyx.data().get("journal").unwrap()["loaded"], json!(true));

    // Names are unique across case.
    let err = c.create_character(player, "aria", DataBag::new()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NameTaken { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    // The active character cannot be deleted.
    let err = c.delete_character(player, "Nyx").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::CannotDeleteActive { .. }));
    assert!(h.registry.is_name_taken("Nyx"));

    // Switch back, then the delete goes through.
    c.switch_character(player, "Aria").await.unwrap();
    c.delete_character(player, "Nyx").await.unwrap();
    assert!(!h.registry.is_name_taken("Nyx"));
    assert_eq!(h.registry.character_id_for_name("nyx"), None);
    assert_eq!(h.registry.owner_of(nyx.id()), None);
    assert!(!h.store.exists(nyx.id()));
    assert_eq!(journal.seen().last(), Some(&Seen::Delete(nyx.id())));
    assert_eq!(c.list_characters(player).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_rejects_rapid_switches() {
    let h = harness(&config(30), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    let nyx = c.create_character(player, "Nyx", DataBag::new()).await.unwrap();

    // First activation does not start the cooldown.
    assert_eq!(c.cooldown_remaining(player), None);
    c.switch_character(player, "Nyx").await.unwrap();

    let err = c.switch_character(player, "Aria").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::CooldownActive { .. }));
    assert_eq!(active_id(c, player).await, Some(nyx.id()));

    tokio::time::advance(Duration::from_secs(30)).await;
    c.switch_character(player, "Aria").await.unwrap();
    assert_eq!(active_id(c, player).await, Some(aria.id()));
}

#[tokio::test(start_paused = true)]
async fn stuck_module_delays_but_never_blocks_switch() {
    let stuck = Arc::new(Stuck::default());
    let h = harness(&config(0), vec![Arc::clone(&stuck) as Arc<dyn FeatureModule>]);
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;

    let started = tokio::time::Instant::now();
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1_000));
    assert_eq!(active_id(c, player).await, Some(aria.id()));
    assert_eq!(stuck.held.lock().len(), 1);
    assert_eq!(c.switch_phase(player), SwitchPhase::Idle);
}

#[tokio::test]
async fn phase_is_observable_while_modules_work() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let h = harness(&config(0), vec![Arc::new(Slow { tickets: tx }) as Arc<dyn FeatureModule>]);
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;
    assert_eq!(h.coordinator.switch_phase(player), SwitchPhase::Idle);

    let coordinator = Arc::clone(&h.coordinator);
    let create = tokio::spawn(async move {
        coordinator
            .create_character(player, "Aria", DataBag::new())
            .await
    });

    let ticket = rx.recv().await.unwrap();
    assert_eq!(h.coordinator.switch_phase(player), SwitchPhase::PreSwitching);
    ticket.complete();

    let aria = create.await.unwrap().unwrap();
    assert_eq!(h.coordinator.switch_phase(player), SwitchPhase::Idle);
    assert_eq!(active_id(&h.coordinator, player).await, Some(aria.id()));
}

#[tokio::test]
async fn vetoed_delete_changes_nothing() {
    let journal = Arc::new(Journal::default());
    let h = harness(
        &config(0),
        vec![
            Arc::clone(&journal) as Arc<dyn FeatureModule>,
            Arc::new(Bank) as Arc<dyn FeatureModule>,
        ],
    );
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    let nyx = c.create_character(player, "Nyx", DataBag::new()).await.unwrap();

    let err = c.delete_character(player, "Nyx").await.unwrap_err();
    match err {
        CoordinatorError::DeletionVetoed { module, reason } => {
            assert_eq!(module, "bank");
            assert_eq!(reason, "vault is not empty");
        }
        other => panic!("expected veto, got {other:?}"),
    }

    assert!(h.registry.is_name_taken("Nyx"));
    assert_eq!(h.registry.owner_of(nyx.id()), Some(player));
    assert!(h.store.exists(nyx.id()));
    assert_eq!(c.list_characters(player).await.unwrap().len(), 2);
    assert!(!journal.seen().contains(&Seen::Delete(nyx.id())));
}

#[tokio::test]
async fn deletion_can_be_disabled() {
    let mut config = config(0);
    config.characters.allow_deletion = false;
    let h = harness(&config, Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    c.create_character(player, "Nyx", DataBag::new()).await.unwrap();

    let err = c.delete_character(player, "Nyx").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::DeletionDisabled));
}

#[tokio::test]
async fn death_falls_back_to_first_live_character_by_name() {
    let journal = Arc::new(Journal::default());
    let h = harness(&config(0), vec![Arc::clone(&journal) as Arc<dyn FeatureModule>]);
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let zed = c.create_character(player, "Zed", DataBag::new()).await.unwrap();
    let aria = c.create_character(player, "aria", DataBag::new()).await.unwrap();
    let nyx = c.create_character(player, "Nyx", DataBag::new()).await.unwrap();
    assert_eq!(active_id(c, player).await, Some(zed.id()));

    c.set_deceased(player, "Zed", true).await.unwrap();
    assert_eq!(active_id(c, player).await, Some(aria.id()));
    assert!(journal.seen().contains(&Seen::Post(switch(
        player,
        Some(zed.id()),
        Some(aria.id()),
        SwitchReason::Fallback
    ))));

    let err = c.switch_character(player, "Zed").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Deceased { .. }));

    c.set_deceased(player, "aria", true).await.unwrap();
    assert_eq!(active_id(c, player).await, Some(nyx.id()));

    c.set_deceased(player, "Nyx", true).await.unwrap();
    assert_eq!(active_id(c, player).await, None);
    assert_eq!(
        journal.seen().last(),
        Some(&Seen::Post(switch(player, Some(nyx.id()), None, SwitchReason::Fallback)))
    );

    // Reviving does not activate.
    c.set_deceased(player, "Nyx", false).await.unwrap();
    assert_eq!(active_id(c, player).await, None);
    c.switch_character(player, "Nyx").await.unwrap();
    assert_eq!(active_id(c, player).await, Some(nyx.id()));

    h.store.clear_cache();
    assert!(h.store.load(zed.id()).unwrap().is_deceased());
}

#[tokio::test]
async fn rename_moves_the_name_binding() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    c.create_character(player, "Nyx", DataBag::new()).await.unwrap();

    // Changing only the casing of one's own name is allowed.
    c.rename_active_character(player, "ARIA").await.unwrap();
    assert_eq!(h.registry.character_id_for_name("aria"), Some(aria.id()));

    let err = c.rename_active_character(player, "nyx").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NameTaken { .. }));

    let err = c.rename_active_character(player, "Ly").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidName(_)));

    c.rename_active_character(player, "Lyra").await.unwrap();
    assert!(!h.registry.is_name_taken("Aria"));
    assert_eq!(h.registry.character_id_for_name("LYRA"), Some(aria.id()));

    h.store.clear_cache();
    assert_eq!(h.store.load(aria.id()).unwrap().display_name(), "Lyra");
}

#[tokio::test]
async fn rename_without_active_character_fails() {
    let h = harness(&config(0), Vec::new());
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;

    let err = h
        .coordinator
        .rename_active_character(player, "Lyra")
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::NoActiveCharacter { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn character_limit_is_enforced() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    for name in ["Aria", "Nyx", "Lyra"] {
        c.create_character(player, name, DataBag::new()).await.unwrap();
    }

    let err = c.create_character(player, "Zed", DataBag::new()).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::CharacterLimitReached { limit: 3 }));
    assert!(!h.registry.is_name_taken("Zed"));
}

#[tokio::test]
async fn starting_and_extra_data_are_merged() {
    let mut config = config(0);
    config
        .characters
        .starting_data
        .insert("aging".to_owned(), json!({"age": 18, "stage": "adult"}));
    let h = harness(&config, Vec::new());
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;

    let mut extra = DataBag::new();
    extra.insert("aging", json!({"age": 40}));
    let aria = h
        .coordinator
        .create_character(player, "Aria", extra)
        .await
        .unwrap();
    assert_eq!(
        aria.data().get("aging"),
        Some(&json!({"age": 40, "stage": "adult"}))
    );

    let age = h
        .coordinator
        .update_character_data(player, "Aria", "aging", |doc| {
            doc["age"] = json!(41);
            doc["age"].as_u64()
        })
        .await
        .unwrap();
    assert_eq!(age, Some(41));
    h.store.clear_cache();
    assert_eq!(
        h.store.load(aria.id()).unwrap().data().get("aging").unwrap()["age"],
        json!(41)
    );
}

#[tokio::test]
async fn operations_require_a_connected_player() {
    let h = harness(&config(0), Vec::new());
    let player = PlayerId::new();

    let err = h
        .coordinator
        .switch_character(player, "Aria")
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::PlayerNotConnected { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(!h.coordinator.disconnect_player(player).await);
}

#[tokio::test]
async fn state_survives_reconnect_and_restart() {
    let h = harness(&config(0), Vec::new());
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;
    let aria = h
        .coordinator
        .create_character(player, "Aria", DataBag::new())
        .await
        .unwrap();
    let nyx = h
        .coordinator
        .create_character(player, "Nyx", DataBag::new())
        .await
        .unwrap();
    h.coordinator.switch_character(player, "Nyx").await.unwrap();

    // Reconnect within the same process.
    assert!(h.coordinator.disconnect_player(player).await);
    assert_eq!(h.store.cached_len(), 0);
    let set = h.coordinator.connect_player(player).await;
    assert_eq!(set.active_id(), Some(nyx.id()));
    assert_eq!(set.len(), 2);

    // Restart: everything is rebuilt from disk.
    h.coordinator.shutdown().await.unwrap();
    let Harness { dir, .. } = h;
    let h = build(dir, &config(0), Vec::new());
    assert_eq!(h.registry.owner_of(aria.id()), Some(player));
    assert!(h.registry.is_name_taken("aria"));
    let set = h.coordinator.connect_player(player).await;
    assert_eq!(set.active_id(), Some(nyx.id()));
    assert_eq!(set.get(aria.id()).unwrap().display_name(), "Aria");
}

#[tokio::test]
async fn missing_character_file_is_skipped_on_connect() {
    let h = harness(&config(0), Vec::new());
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;
    h.coordinator
        .create_character(player, "Aria", DataBag::new())
        .await
        .unwrap();
    let nyx = h
        .coordinator
        .create_character(player, "Nyx", DataBag::new())
        .await
        .unwrap();
    h.coordinator.disconnect_player(player).await;

    std::fs::remove_file(h.store.path_for(nyx.id())).unwrap();
    let set = h.coordinator.connect_player(player).await;
    assert_eq!(set.len(), 1);
    assert!(!set.contains(nyx.id()));
}

#[tokio::test]
async fn peer_receives_increasing_revisions() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    c.create_character(player, "Nyx", DataBag::new()).await.unwrap();
    c.switch_character(player, "Nyx").await.unwrap();

    let pushes = h.peer.pushes.lock().clone();
    assert!(pushes.len() >= 4);
    assert!(pushes.iter().all(|(destination, _)| *destination == player));
    assert!(pushes.windows(2).all(|pair| pair[1].1.supersedes(Some(&pair[0].1))));
    let (_, last) = pushes.last().unwrap();
    assert_ne!(last.active_character_id, Some(aria.id()));
    assert_eq!(last.characters.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_of_one_name_have_one_winner() {
    let h = harness(&config(0), Vec::new());
    let players: Vec<PlayerId> = (0..8).map(|_| PlayerId::new()).collect();
    for &player in &players {
        h.coordinator.connect_player(player).await;
    }

    let handles: Vec<_> = players
        .iter()
        .map(|&player| {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move {
                coordinator
                    .create_character(player, "Aria", DataBag::new())
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(CoordinatorError::NameTaken { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(h.registry.len(), 1);
}

#[tokio::test]
async fn admin_force_acts_on_offline_owner() {
    let h = harness(&config(0), Vec::new());
    let owner = PlayerId::new();
    let admin = PlayerId::new();
    h.coordinator.connect_player(owner).await;
    h.coordinator
        .create_character(owner, "Aria", DataBag::new())
        .await
        .unwrap();
    h.coordinator
        .create_character(owner, "Nyx", DataBag::new())
        .await
        .unwrap();
    h.coordinator.disconnect_player(owner).await;

    let listing = AdminCommand::parse("force Aria list")
        .unwrap()
        .execute(&h.coordinator, admin)
        .await
        .unwrap();
    assert!(listing.contains("Aria (active)"));
    assert!(listing.contains("Nyx"));
    assert!(!h.coordinator.is_connected(owner));

    AdminCommand::parse(&format!("force {owner} kill Nyx"))
        .unwrap()
        .execute(&h.coordinator, admin)
        .await
        .unwrap();
    let set = h.coordinator.connect_player(owner).await;
    let nyx = set.resolve("Nyx").unwrap();
    assert!(set.get(nyx).unwrap().is_deceased());

    let err = AdminCommand::parse("force Nobody list")
        .unwrap()
        .execute(&h.coordinator, admin)
        .await
        .unwrap_err();
    assert!(matches!(err, personae_core::AdminError::UnknownPlayer { .. }));
}

#[tokio::test]
async fn switch_to_active_character_is_rejected() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    let pushes = h.peer.pushes.lock().len();

    let err = c.switch_character(player, "ARIA").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::AlreadyActive { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(active_id(c, player).await, Some(aria.id()));
    assert_eq!(h.peer.pushes.lock().len(), pushes);
}

#[tokio::test]
async fn malformed_name_is_rejected_before_anything_is_written() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;

    for name in ["Ar!a", "Al", "TheAdminOfAll"] {
        let err = c.create_character(player, name, DataBag::new()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidName(_)), "{name}: {err:?}");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!h.registry.is_name_taken(name));
    }
    assert!(h.registry.is_empty());
    assert!(h.store.list_ids().is_empty());
    assert!(c.list_characters(player).await.unwrap().is_empty());
}

#[tokio::test]
async fn recasing_own_name_survives_tightened_rules() {
    let h = harness(&config(0), Vec::new());
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;
    let aria = h
        .coordinator
        .create_character(player, "Aria", DataBag::new())
        .await
        .unwrap();
    h.coordinator.shutdown().await.unwrap();

    // Restart with rules that would no longer accept the name.
    let mut strict = config(0);
    strict.names.blacklist.push("aria".to_owned());
    let Harness { dir, .. } = h;
    let h = build(dir, &strict, Vec::new());
    h.coordinator.connect_player(player).await;

    h.coordinator.rename_active_character(player, "Aria").await.unwrap();
    h.coordinator.rename_active_character(player, "ARIA").await.unwrap();
    assert_eq!(h.registry.character_id_for_name("aria"), Some(aria.id()));
    let active = h.coordinator.active_character(player).await.unwrap().unwrap();
    assert_eq!(active.display_name(), "ARIA");

    let err = h
        .coordinator
        .rename_active_character(player, "Ariadne")
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidName(_)));
}

#[tokio::test]
async fn failed_rename_save_restores_old_name() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();

    // Replace the characters directory with a file so every save fails.
    std::fs::remove_dir_all(h.store.dir()).unwrap();
    std::fs::write(h.store.dir(), b"blocked").unwrap();

    let err = c.rename_active_character(player, "Lyra").await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Persistence { .. }));
    assert_eq!(err.kind(), ErrorKind::Persistence);

    assert_eq!(h.registry.character_id_for_name("aria"), Some(aria.id()));
    assert!(!h.registry.is_name_taken("Lyra"));
    assert_eq!(h.registry.owner_of(aria.id()), Some(player));
    let active = c.active_character(player).await.unwrap().unwrap();
    assert_eq!(active.display_name(), "Aria");
}

#[tokio::test]
async fn reconnect_during_switch_sees_committed_state() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let h = harness(&config(0), vec![Arc::new(Slow { tickets: tx }) as Arc<dyn FeatureModule>]);
    let player = PlayerId::new();
    h.coordinator.connect_player(player).await;

    let coordinator = Arc::clone(&h.coordinator);
    let create = tokio::spawn(async move {
        coordinator
            .create_character(player, "Aria", DataBag::new())
            .await
    });
    rx.recv().await.unwrap().complete();
    create.await.unwrap().unwrap();
    let nyx = h
        .coordinator
        .create_character(player, "Nyx", DataBag::new())
        .await
        .unwrap();

    // The switch holds the session while its ticket is outstanding.
    let coordinator = Arc::clone(&h.coordinator);
    let switch = tokio::spawn(async move { coordinator.switch_character(player, "Nyx").await });
    let ticket = rx.recv().await.unwrap();

    // A disconnect queues behind the switch, then a reconnect behind both.
    let coordinator = Arc::clone(&h.coordinator);
    let disconnect = tokio::spawn(async move { coordinator.disconnect_player(player).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    let coordinator = Arc::clone(&h.coordinator);
    let reconnect = tokio::spawn(async move { coordinator.connect_player(player).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    ticket.complete();
    switch.await.unwrap().unwrap();
    assert!(disconnect.await.unwrap());
    let set = reconnect.await.unwrap();

    assert_eq!(set.active_id(), Some(nyx.id()));
    assert!(h.coordinator.is_connected(player));
    assert_eq!(active_id(&h.coordinator, player).await, Some(nyx.id()));
    assert_eq!(h.coordinator.switch_phase(player), SwitchPhase::Idle);
}

#[tokio::test]
async fn only_requested_switches_are_stamped() {
    let h = harness(&config(0), Vec::new());
    let c = &h.coordinator;
    let player = PlayerId::new();
    c.connect_player(player).await;
    let aria = c.create_character(player, "Aria", DataBag::new()).await.unwrap();
    c.create_character(player, "Nyx", DataBag::new()).await.unwrap();

    let state = h.players.load(player);
    assert_eq!(state.active_character_id, Some(aria.id()));
    assert_eq!(state.last_switch_at, None);

    c.switch_character(player, "Nyx").await.unwrap();
    let stamped = h.players.load(player).last_switch_at;
    assert!(stamped.is_some());

    c.set_deceased(player, "Nyx", true).await.unwrap();
    let state = h.players.load(player);
    assert_eq!(state.active_character_id, Some(aria.id()));
    assert_eq!(state.last_switch_at, stamped);
}
