//! Storage layer for the Personae character lifecycle coordinator.
//!
//! Everything Personae persists is a compressed, self-describing document
//! file. This crate owns the document format and the two file-backed
//! stores built on it; the identity registry reuses the same codec for
//! its global index file.
//!
//! # Layout
//!
//! ```text
//! <data_dir>/
//!     character-index.dat      (personae-registry)
//!     characters/<id>.dat      (CharacterStore)
//!     players/<id>.dat         (PlayerStateStore)
//! ```
//!
//! # Modules
//!
//! - [`codec`] -- gzip + JSON envelope encoding and atomic file writes
//! - [`character_store`] -- [`CharacterStore`], one file per character
//! - [`player_store`] -- [`PlayerStateStore`], one file per player
//! - [`error`] -- Shared error types

pub mod character_store;
pub mod codec;
pub mod error;
pub mod player_store;

// Re-export primary types for convenience.
pub use character_store::CharacterStore;
pub use error::DbError;
pub use player_store::{PlayerState, PlayerStateStore};
