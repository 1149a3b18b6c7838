//! The feature-module contract.
//!
//! A feature module owns one namespace of every character's data bag
//! (inventory, location, aging, ...) and is told about character lifecycle
//! events in registration order:
//!
//! - **create**: initialize the module's namespace on a new record.
//! - **pre-switch**: persist outgoing state, then release the
//!   [`BarrierTicket`]. The coordinator waits for every ticket.
//! - **switch**: restore incoming state once the active pointer has moved.
//! - **delete**: veto the deletion, or perform a final transfer once no
//!   module objected.
//!
//! Every hook has a no-op default, so a module implements only what it
//! needs.

use std::sync::Arc;

use personae_types::{CharacterId, CharacterRecord, PlayerId};
use tracing::{debug, info};

use crate::barrier::{BarrierTicket, SwitchBarrier};

/// A character was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateEvent {
    /// The owning player.
    pub player: PlayerId,
    /// The new character.
    pub character_id: CharacterId,
}

/// Why the active character is changing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// The player asked to switch.
    Requested,
    /// The player's first character became active on creation.
    FirstCharacter,
    /// The active character became unusable and a replacement was picked.
    Fallback,
}

/// The active character is changing from `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchEvent {
    /// The player switching.
    pub player: PlayerId,
    /// The outgoing character, if one was active.
    pub from: Option<CharacterId>,
    /// The incoming character, or `None` when no character remains.
    pub to: Option<CharacterId>,
    /// What triggered the switch.
    pub reason: SwitchReason,
}

/// A character is about to be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteEvent {
    /// The owning player.
    pub player: PlayerId,
    /// The character being deleted.
    pub character_id: CharacterId,
}

/// A pluggable consumer of character lifecycle events.
pub trait FeatureModule: Send + Sync {
    /// Stable name, used in logs and veto messages.
    fn name(&self) -> &str;

    /// Whether the module's backing integration is present.
    ///
    /// Modules reporting `false` are skipped at registration.
    fn is_available(&self) -> bool {
        true
    }

    /// A record was created and is about to be stored.
    fn on_create(&self, _event: &CreateEvent, _record: &mut CharacterRecord) {}

    /// The active character is about to change.
    ///
    /// `outgoing` is the record being switched away from. The module must
    /// release `ticket`, either before returning or from a task it spawns.
    fn on_pre_switch(
        &self,
        _event: &SwitchEvent,
        _outgoing: Option<&mut CharacterRecord>,
        ticket: BarrierTicket,
    ) {
        ticket.complete();
    }

    /// The active character has changed. `incoming` is the new one.
    fn on_switch(&self, _event: &SwitchEvent, _incoming: Option<&mut CharacterRecord>) {}

    /// Decide whether `record` may be deleted.
    ///
    /// # Errors
    ///
    /// Returns the reason for refusing the deletion.
    fn check_delete(&self, _event: &DeleteEvent, _record: &CharacterRecord) -> Result<(), String> {
        Ok(())
    }

    /// `record` is being deleted and no module vetoed it.
    fn on_delete(&self, _event: &DeleteEvent, _record: &CharacterRecord) {}
}

/// A veto raised by a module during [`ModuleSet::check_delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Veto {
    /// The vetoing module.
    pub module: String,
    /// The module's reason.
    pub reason: String,
}

/// The ordered list of registered modules.
#[derive(Default)]
pub struct ModuleSet {
    modules: Vec<Arc<dyn FeatureModule>>,
}

impl std::fmt::Debug for ModuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ModuleSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a module. Unavailable modules are skipped and `false` is
    /// returned.
    pub fn register(&mut self, module: Arc<dyn FeatureModule>) -> bool {
        if !module.is_available() {
            debug!(module = module.name(), "Feature module unavailable, skipping");
            return false;
        }
        info!(module = module.name(), "Registered feature module");
        self.modules.push(module);
        true
    }

    /// Names of registered modules, in order.
    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether no module is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub(crate) fn notify_create(&self, event: &CreateEvent, record: &mut CharacterRecord) {
        for module in &self.modules {
            module.on_create(event, record);
        }
    }

    pub(crate) fn pre_switch(
        &self,
        event: &SwitchEvent,
        mut outgoing: Option<&mut CharacterRecord>,
        barrier: &SwitchBarrier,
    ) {
        for module in &self.modules {
            let ticket = barrier.ticket(module.name());
            module.on_pre_switch(event, outgoing.as_deref_mut(), ticket);
        }
    }

    pub(crate) fn post_switch(&self, event: &SwitchEvent, mut incoming: Option<&mut CharacterRecord>) {
        for module in &self.modules {
            module.on_switch(event, incoming.as_deref_mut());
        }
    }

    /// Ask every module, stopping at the first veto.
    pub(crate) fn check_delete(&self, event: &DeleteEvent, record: &CharacterRecord) -> Result<(), Veto> {
        for module in &self.modules {
            module
                .check_delete(event, record)
                .map_err(|reason| Veto {
                    module: module.name().to_owned(),
                    reason,
                })?;
        }
        Ok(())
    }

    pub(crate) fn notify_delete(&self, event: &DeleteEvent, record: &CharacterRecord) {
        for module in &self.modules {
            module.on_delete(event, record);
        }
    }
}
