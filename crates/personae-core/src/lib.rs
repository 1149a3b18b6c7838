//! Character lifecycle coordination for Personae.
//!
//! This crate ties the data model, the character store, and the identity
//! registry together behind the [`SwitchCoordinator`], which implements
//! character creation, the two-phase switch protocol, renaming, death and
//! deletion. Feature modules plug in through [`FeatureModule`].
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration loading and typed config structs
//! - [`names`] -- character name validation rules
//! - [`cooldown`] -- per-player switch cooldown tracking
//! - [`barrier`] -- the pre-switch completion barrier
//! - [`module`] -- the feature-module contract and lifecycle events
//! - [`sync`] -- the peer state-push contract
//! - [`coordinator`] -- the [`SwitchCoordinator`] itself
//! - [`admin`] -- text commands over the coordinator
//! - [`error`] -- the coordinator error taxonomy

pub mod admin;
pub mod barrier;
pub mod config;
pub mod cooldown;
pub mod coordinator;
pub mod error;
pub mod module;
pub mod names;
pub mod sync;

// Re-export primary types at crate root.
pub use admin::{AdminAction, AdminCommand, AdminError};
pub use barrier::{BarrierOutcome, BarrierTicket, SwitchBarrier};
pub use config::{ConfigError, PersonaeConfig};
pub use cooldown::CooldownTracker;
pub use coordinator::{SwitchCoordinator, SwitchPhase};
pub use error::{CoordinatorError, ErrorKind};
pub use module::{CreateEvent, DeleteEvent, FeatureModule, ModuleSet, SwitchEvent, SwitchReason, Veto};
pub use names::{NameError, NameRules};
pub use sync::{NoopPeerSync, PeerSync};
