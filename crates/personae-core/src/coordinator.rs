//! The switch coordinator: every character lifecycle operation.
//!
//! The coordinator owns one session per connected player. A session holds
//! the player's [`PlayerCharacterSet`] behind an async mutex, so operations
//! for the same player run one at a time while different players proceed
//! in parallel. The identity registry is the only state shared across
//! players.
//!
//! # Switch pipeline
//!
//! 1. Validation (cooldown, target, deceased, already active). Nothing is
//!    mutated before every check has passed.
//! 2. Pre-switch: each module receives a [`BarrierTicket`](crate::BarrierTicket)
//!    and the outgoing record; the coordinator waits for all tickets, up to
//!    the configured timeout, then proceeds regardless.
//! 3. Commit: the active pointer moves.
//! 4. Post-switch: each module receives the incoming record.
//! 5. The affected records and the player state file are saved, the
//!    cooldown starts (requested switches only), and the new state is
//!    pushed to the peer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use personae_db::{CharacterStore, PlayerState, PlayerStateStore};
use personae_registry::{IdentityRegistry, RegistryError};
use personae_types::{
    CharacterId, CharacterRecord, CharacterSetSync, CharacterSummary, DataBag, PlayerCharacterSet,
    PlayerId,
};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::barrier::{BarrierOutcome, SwitchBarrier};
use crate::config::{CharactersConfig, ConfigError, PersonaeConfig};
use crate::cooldown::CooldownTracker;
use crate::error::CoordinatorError;
use crate::module::{CreateEvent, DeleteEvent, FeatureModule, ModuleSet, SwitchEvent, SwitchReason};
use crate::names::NameRules;
use crate::sync::PeerSync;

/// Where a player is in the switch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchPhase {
    /// No switch in progress.
    #[default]
    Idle,
    /// Waiting for feature modules at the pre-switch barrier.
    PreSwitching,
    /// Moving the active pointer and restoring incoming state.
    Committing,
}

#[derive(Debug)]
struct PlayerSession {
    set: PlayerCharacterSet,
    revision: u64,
    /// Wall-clock time of the last requested switch. Persisted with the
    /// player state for operators; the cooldown itself runs on
    /// [`CooldownTracker`].
    last_switch_at: Option<DateTime<Utc>>,
    /// Set under the lock by `disconnect_player`. A closed session is no
    /// longer in the session map and must not be operated on.
    closed: bool,
}

impl PlayerSession {
    fn resolve(&self, target: &str) -> Result<CharacterId, CoordinatorError> {
        self.set
            .resolve(target)
            .ok_or_else(|| CoordinatorError::CharacterNotFound {
                target: target.to_owned(),
            })
    }

    fn record(&self, id: CharacterId) -> Result<&CharacterRecord, CoordinatorError> {
        self.set
            .get(id)
            .ok_or_else(|| CoordinatorError::CharacterNotFound {
                target: id.to_string(),
            })
    }

    fn display_name(&self, id: CharacterId) -> String {
        self.set
            .get(id)
            .map_or_else(|| id.to_string(), |record| record.display_name().to_owned())
    }
}

/// Orchestrates character creation, switching, renaming, and deletion.
pub struct SwitchCoordinator {
    config: CharactersConfig,
    names: NameRules,
    starting_data: DataBag,
    registry: Arc<IdentityRegistry>,
    store: Arc<CharacterStore>,
    players: Arc<PlayerStateStore>,
    modules: ModuleSet,
    peer: Arc<dyn PeerSync>,
    sessions: DashMap<PlayerId, Arc<Mutex<PlayerSession>>>,
    phases: DashMap<PlayerId, SwitchPhase>,
    cooldowns: CooldownTracker,
}

impl std::fmt::Debug for SwitchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchCoordinator")
            .field("modules", &self.modules)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl SwitchCoordinator {
    /// Build a coordinator over already-opened services.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NamePattern`] if the configured name pattern
    /// does not compile.
    pub fn new(
        config: &PersonaeConfig,
        registry: Arc<IdentityRegistry>,
        store: Arc<CharacterStore>,
        players: Arc<PlayerStateStore>,
        peer: Arc<dyn PeerSync>,
    ) -> Result<Self, ConfigError> {
        let names = NameRules::from_config(&config.names)?;
        Ok(Self {
            config: config.characters.clone(),
            names,
            starting_data: config.characters.starting_bag(),
            registry,
            store,
            players,
            modules: ModuleSet::new(),
            peer,
            sessions: DashMap::new(),
            phases: DashMap::new(),
            cooldowns: CooldownTracker::new(config.characters.switch_cooldown()),
        })
    }

    /// Register a feature module. Returns `false` if it was skipped as
    /// unavailable.
    pub fn register_module(&mut self, module: Arc<dyn FeatureModule>) -> bool {
        self.modules.register(module)
    }

    /// The registered modules.
    pub const fn modules(&self) -> &ModuleSet {
        &self.modules
    }

    /// The global identity registry.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Load a player's characters and restore their active pointer.
    ///
    /// Connecting an already-connected player returns the live state. If a
    /// disconnect is in progress, this waits for it and loads what it saved.
    /// Characters whose files are missing are skipped, and a stored active
    /// pointer that no longer names a live character is cleared.
    pub async fn connect_player(&self, player: PlayerId) -> PlayerCharacterSet {
        loop {
            let (handle, fresh) = match self.session_handle(player) {
                Some(existing) => (existing, false),
                None => {
                    let created = Arc::new(Mutex::new(self.load_session(player)));
                    let handle = Arc::clone(
                        self.sessions
                            .entry(player)
                            .or_insert_with(|| Arc::clone(&created))
                            .value(),
                    );
                    let fresh = Arc::ptr_eq(&handle, &created);
                    (handle, fresh)
                }
            };

            let mut session = handle.lock().await;
            if session.closed {
                // A disconnect won the lock; its files are saved, so load again.
                continue;
            }
            if !fresh {
                return session.set.clone();
            }
            self.phases.entry(player).or_insert(SwitchPhase::Idle);
            info!(
                player_id = %player,
                characters = session.set.len(),
                active = ?session.set.active_id(),
                "Player connected"
            );
            self.push(&mut session);
            return session.set.clone();
        }
    }

    /// Save everything for `player` and drop their session.
    ///
    /// Returns `false` if the player was not connected.
    pub async fn disconnect_player(&self, player: PlayerId) -> bool {
        let Some(handle) = self.session_handle(player) else {
            return false;
        };
        let mut session = handle.lock().await;
        if session.closed {
            return false;
        }
        for record in session.set.iter() {
            self.store.save(record);
            self.store.evict(record.id());
        }
        self.save_player_state(&session);
        session.closed = true;

        // Both maps are cleared while the lock is held, so a reconnect
        // waiting on it sees the session closed and loads the saved files.
        self.phases.remove(&player);
        self.sessions
            .remove_if(&player, |_, current| Arc::ptr_eq(current, &handle));
        info!(player_id = %player, "Player disconnected");
        true
    }

    /// Whether `player` has a live session.
    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.sessions.contains_key(&player)
    }

    /// Every connected player, sorted.
    pub fn connected_players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        players.sort_unstable();
        players
    }

    /// Disconnect every player and flush the identity index.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the final index write fails.
    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        for player in self.connected_players() {
            self.disconnect_player(player).await;
        }
        self.registry.flush()?;
        info!("Coordinator shut down");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Create a character named `name` for `player`.
    ///
    /// `extra` is merged over the configured starting data. If the player
    /// has no active character, the new one is switched to immediately.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad or taken name or a full roster,
    /// [`CoordinatorError::PlayerNotConnected`], or
    /// [`CoordinatorError::Persistence`] if the new record could not be
    /// saved (the name is released again).
    pub async fn create_character(
        &self,
        player: PlayerId,
        name: &str,
        extra: DataBag,
    ) -> Result<CharacterRecord, CoordinatorError> {
        let mut session = self.live_session(player).await?;

        self.names.validate(name)?;
        let limit = self.config.max_per_player;
        if limit > 0 && session.set.len() >= usize::try_from(limit).unwrap_or(usize::MAX) {
            return Err(CoordinatorError::CharacterLimitReached { limit });
        }

        let id = CharacterId::new();
        let mut record = CharacterRecord::new(id, name);
        record.data_mut().merge_all(self.starting_data.clone());
        record.data_mut().merge_all(extra);

        if !self.registry.register(id, player, name) {
            return Err(CoordinatorError::NameTaken {
                name: name.to_owned(),
            });
        }

        let event = CreateEvent {
            player,
            character_id: id,
        };
        self.modules.notify_create(&event, &mut record);

        if let Err(source) = self.store.try_save(&record) {
            self.registry.unregister(id, name);
            return Err(CoordinatorError::Persistence {
                character_id: id,
                source,
            });
        }

        session.set.insert(record)?;
        info!(player_id = %player, character_id = %id, name, "Character created");

        if session.set.active_id().is_none() {
            self.perform_switch(&mut session, Some(id), SwitchReason::FirstCharacter)
                .await?;
        } else {
            self.push(&mut session);
        }

        Ok(session.record(id)?.clone())
    }

    /// Make `target` (a name or id) the player's active character.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if the cooldown has not elapsed, the
    /// target is unknown, deceased, or already active.
    pub async fn switch_character(&self, player: PlayerId, target: &str) -> Result<(), CoordinatorError> {
        let mut session = self.live_session(player).await?;

        if let Some(remaining) = self.cooldowns.remaining(player) {
            return Err(CoordinatorError::CooldownActive { remaining });
        }
        let to = session.resolve(target)?;
        let record = session.record(to)?;
        if record.is_deceased() {
            return Err(CoordinatorError::Deceased {
                name: record.display_name().to_owned(),
            });
        }
        if session.set.is_active(to) {
            return Err(CoordinatorError::AlreadyActive {
                name: record.display_name().to_owned(),
            });
        }

        self.perform_switch(&mut session, Some(to), SwitchReason::Requested)
            .await?;
        self.cooldowns.record(player);
        Ok(())
    }

    /// Delete an inactive character.
    ///
    /// Modules may veto; a veto leaves everything untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::DeletionDisabled`],
    /// [`CoordinatorError::CharacterNotFound`],
    /// [`CoordinatorError::CannotDeleteActive`],
    /// [`CoordinatorError::DeletionVetoed`], or
    /// [`CoordinatorError::Persistence`] if the file could not be removed.
    pub async fn delete_character(&self, player: PlayerId, target: &str) -> Result<(), CoordinatorError> {
        if !self.config.allow_deletion {
            return Err(CoordinatorError::DeletionDisabled);
        }
        let mut session = self.live_session(player).await?;

        let id = session.resolve(target)?;
        let record = session.record(id)?;
        if session.set.is_active(id) {
            return Err(CoordinatorError::CannotDeleteActive {
                name: record.display_name().to_owned(),
            });
        }

        let event = DeleteEvent {
            player,
            character_id: id,
        };
        if let Err(veto) = self.modules.check_delete(&event, record) {
            warn!(
                player_id = %player,
                character_id = %id,
                module = %veto.module,
                reason = %veto.reason,
                "Deletion vetoed"
            );
            return Err(CoordinatorError::DeletionVetoed {
                module: veto.module,
                reason: veto.reason,
            });
        }

        self.store
            .try_delete(id)
            .map_err(|source| CoordinatorError::Persistence {
                character_id: id,
                source,
            })?;
        self.modules.notify_delete(&event, record);

        if let Some(removed) = session.set.remove(id) {
            self.registry.unregister(id, removed.display_name());
            info!(player_id = %player, character_id = %id, name = removed.display_name(), "Character deleted");
        }
        self.push(&mut session);
        Ok(())
    }

    /// Rename the player's active character.
    ///
    /// Changing only the casing of the current name is always allowed and
    /// skips the format rules, so it still works after the rules tighten.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::NoActiveCharacter`], a name validation
    /// error, [`CoordinatorError::NameTaken`], or
    /// [`CoordinatorError::Persistence`]. After a persistence failure the
    /// old name is restored, unless another character claimed it in the
    /// meantime; then the new name stays on both the record and the
    /// registry so the two never disagree.
    pub async fn rename_active_character(&self, player: PlayerId, new_name: &str) -> Result<(), CoordinatorError> {
        let mut session = self.live_session(player).await?;

        let id = session
            .set
            .active_id()
            .ok_or(CoordinatorError::NoActiveCharacter { player })?;
        let old_name = session.display_name(id);
        if old_name == new_name {
            return Ok(());
        }
        if old_name.to_lowercase() != new_name.to_lowercase() {
            self.names.validate(new_name)?;
        }

        let renamed = self.registry.update_name(id, &old_name, new_name)
            || (self.registry.name_of(id).is_none() && self.registry.register(id, player, new_name));
        if !renamed {
            return Err(CoordinatorError::NameTaken {
                name: new_name.to_owned(),
            });
        }
        session.set.rename(id, new_name)?;

        let saved = self.store.try_save(session.record(id)?);
        if let Err(source) = saved {
            if self.registry.update_name(id, new_name, &old_name) {
                session.set.rename(id, old_name.as_str())?;
            } else {
                error!(
                    player_id = %player,
                    character_id = %id,
                    old_name = %old_name,
                    new_name,
                    "Old name was claimed during a failed rename, keeping the new name"
                );
                self.push(&mut session);
            }
            return Err(CoordinatorError::Persistence {
                character_id: id,
                source,
            });
        }

        info!(
            player_id = %player,
            character_id = %id,
            old_name = %old_name,
            new_name,
            "Character renamed"
        );
        self.push(&mut session);
        Ok(())
    }

    /// Mark `target` deceased, or bring it back.
    ///
    /// Marking the active character deceased first falls back to another
    /// live character (or to none). Reviving never activates a character.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::CharacterNotFound`] or
    /// [`CoordinatorError::PlayerNotConnected`].
    pub async fn set_deceased(&self, player: PlayerId, target: &str, deceased: bool) -> Result<(), CoordinatorError> {
        let mut session = self.live_session(player).await?;

        let id = session.resolve(target)?;
        if session.record(id)?.is_deceased() == deceased {
            return Ok(());
        }

        if deceased && session.set.is_active(id) {
            let fallback = session.set.fallback_candidate(id);
            info!(
                player_id = %player,
                character_id = %id,
                fallback = ?fallback,
                "Active character died, falling back"
            );
            self.perform_switch(&mut session, fallback, SwitchReason::Fallback)
                .await?;
        }

        session.set.set_deceased(id, deceased)?;
        self.store.save(session.record(id)?);
        info!(player_id = %player, character_id = %id, deceased, "Deceased flag changed");
        self.push(&mut session);
        Ok(())
    }

    /// Mutate one namespace of a character's data bag and save the record.
    ///
    /// The namespace is created as an empty object if absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::CharacterNotFound`] or
    /// [`CoordinatorError::Persistence`]. A persistence failure leaves the
    /// in-memory change in place.
    pub async fn update_character_data<F, R>(
        &self,
        player: PlayerId,
        target: &str,
        namespace: &str,
        update: F,
    ) -> Result<R, CoordinatorError>
    where
        F: FnOnce(&mut Value) -> R + Send,
    {
        let mut session = self.live_session(player).await?;

        let id = session.resolve(target)?;
        let record = session
            .set
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::CharacterNotFound {
                target: target.to_owned(),
            })?;
        let result = update(record.data_mut().namespace_mut(namespace));
        self.store
            .try_save(record)
            .map_err(|source| CoordinatorError::Persistence {
                character_id: id,
                source,
            })?;
        debug!(player_id = %player, character_id = %id, namespace, "Character data updated");
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Summaries of the player's characters, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::PlayerNotConnected`].
    pub async fn list_characters(&self, player: PlayerId) -> Result<Vec<CharacterSummary>, CoordinatorError> {
        let session = self.live_session(player).await?;
        Ok(session.set.summaries())
    }

    /// The player's active character, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::PlayerNotConnected`].
    pub async fn active_character(&self, player: PlayerId) -> Result<Option<CharacterRecord>, CoordinatorError> {
        let session = self.live_session(player).await?;
        Ok(session.set.active().cloned())
    }

    /// A snapshot of the player's whole character set.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::PlayerNotConnected`].
    pub async fn character_set(&self, player: PlayerId) -> Result<PlayerCharacterSet, CoordinatorError> {
        let session = self.live_session(player).await?;
        Ok(session.set.clone())
    }

    /// Where `player` is in the switch pipeline. Readable while a switch
    /// is in flight.
    pub fn switch_phase(&self, player: PlayerId) -> SwitchPhase {
        self.phases.get(&player).map_or(SwitchPhase::Idle, |phase| *phase)
    }

    /// Time left on the player's switch cooldown.
    pub fn cooldown_remaining(&self, player: PlayerId) -> Option<Duration> {
        self.cooldowns.remaining(player)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn session_handle(&self, player: PlayerId) -> Option<Arc<Mutex<PlayerSession>>> {
        self.sessions.get(&player).map(|entry| Arc::clone(entry.value()))
    }

    async fn live_session(&self, player: PlayerId) -> Result<OwnedMutexGuard<PlayerSession>, CoordinatorError> {
        let handle = self
            .session_handle(player)
            .ok_or(CoordinatorError::PlayerNotConnected { player })?;
        let session = handle.lock_owned().await;
        if session.closed {
            return Err(CoordinatorError::PlayerNotConnected { player });
        }
        Ok(session)
    }

    fn load_session(&self, player: PlayerId) -> PlayerSession {
        let mut set = PlayerCharacterSet::new(player);
        for id in self.registry.characters_of(player) {
            let Some(record) = self.store.load(id) else {
                warn!(player_id = %player, character_id = %id, "Indexed character has no file, skipping");
                continue;
            };
            if let Err(e) = set.insert(record) {
                warn!(player_id = %player, character_id = %id, error = %e, "Skipping character");
            }
        }

        let state = self.players.load(player);
        if let Err(e) = set.set_active(state.active_character_id) {
            warn!(player_id = %player, error = %e, "Stored active character is unusable, clearing");
        }

        PlayerSession {
            set,
            revision: 0,
            last_switch_at: state.last_switch_at,
            closed: false,
        }
    }

    async fn perform_switch(
        &self,
        session: &mut PlayerSession,
        to: Option<CharacterId>,
        reason: SwitchReason,
    ) -> Result<(), CoordinatorError> {
        let player = session.set.player_id();
        let event = SwitchEvent {
            player,
            from: session.set.active_id(),
            to,
            reason,
        };

        self.phases.insert(player, SwitchPhase::PreSwitching);
        let barrier = SwitchBarrier::new();
        let outgoing = event.from.and_then(|id| session.set.get_mut(id));
        self.modules.pre_switch(&event, outgoing, &barrier);
        match barrier.wait(self.config.barrier_timeout()).await {
            BarrierOutcome::Completed => {
                debug!(player_id = %player, "Pre-switch barrier completed");
            }
            BarrierOutcome::TimedOut { pending } => {
                warn!(
                    player_id = %player,
                    pending = ?pending,
                    "Pre-switch barrier timed out, proceeding with switch"
                );
            }
        }

        self.phases.insert(player, SwitchPhase::Committing);
        if let Err(e) = session.set.set_active(to) {
            self.phases.insert(player, SwitchPhase::Idle);
            return Err(e.into());
        }
        let incoming = to.and_then(|id| session.set.get_mut(id));
        self.modules.post_switch(&event, incoming);

        for id in [event.from, event.to].into_iter().flatten() {
            if let Some(record) = session.set.get(id) {
                self.store.save(record);
            }
        }
        if reason == SwitchReason::Requested {
            session.last_switch_at = Some(Utc::now());
        }
        self.save_player_state(session);
        self.phases.insert(player, SwitchPhase::Idle);

        info!(
            player_id = %player,
            from = ?event.from,
            to = ?event.to,
            reason = ?reason,
            "Character switched"
        );
        self.push(session);
        Ok(())
    }

    fn save_player_state(&self, session: &PlayerSession) {
        let state = PlayerState {
            active_character_id: session.set.active_id(),
            last_switch_at: session.last_switch_at,
        };
        self.players.save(session.set.player_id(), &state);
    }

    fn push(&self, session: &mut PlayerSession) {
        session.revision = session.revision.saturating_add(1);
        let state = CharacterSetSync::from_set(&session.set, session.revision);
        self.peer.push_state(&state, session.set.player_id());
    }
}
