//! Shared type definitions for the Personae character lifecycle coordinator.
//!
//! Every other crate in the workspace builds on these types: the store
//! persists [`CharacterRecord`]s, the registry indexes [`CharacterId`]s by
//! owner and name, and the coordinator mutates [`PlayerCharacterSet`]s.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for players and characters
//! - [`record`] -- [`CharacterRecord`] and its namespaced [`DataBag`]
//! - [`character_set`] -- [`PlayerCharacterSet`] with the active pointer
//! - [`sync`] -- Full-state payloads pushed to remote peers

pub mod character_set;
pub mod ids;
pub mod record;
pub mod sync;

// Re-export all public types at crate root for convenience.
pub use character_set::{CharacterSetError, PlayerCharacterSet};
pub use ids::{CharacterId, PlayerId};
pub use record::{CharacterRecord, DataBag};
pub use sync::{CharacterSetSync, CharacterSummary};
