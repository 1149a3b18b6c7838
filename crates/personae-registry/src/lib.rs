//! Global character identity registry for Personae.
//!
//! Character names are unique across every player on the server, and any
//! subsystem may need to ask "who owns this character?" or "which
//! character is called this?". The [`IdentityRegistry`] answers both and
//! is the only place where a name can be claimed.
//!
//! # Architecture
//!
//! - [`registry`] -- [`IdentityRegistry`]: the in-memory index behind a
//!   reader/writer lock, flushed to disk after every mutation.
//! - [`index`] -- [`IndexDocument`]: the on-disk shape of the index file.
//!
//! # Usage
//!
//! ```
//! use personae_registry::IdentityRegistry;
//! use personae_types::{CharacterId, PlayerId};
//!
//! let registry = IdentityRegistry::in_memory();
//! let aria = CharacterId::new();
//! let player = PlayerId::new();
//!
//! assert!(registry.register(aria, player, "Aria"));
//! assert!(registry.is_name_taken("ARIA"));
//! assert!(!registry.register(CharacterId::new(), player, "aria"));
//! assert_eq!(registry.owner_of(aria), Some(player));
//! ```

pub mod index;
pub mod registry;

// Re-export primary types at crate root.
pub use index::IndexDocument;
pub use registry::IdentityRegistry;

/// Errors surfaced by explicit registry maintenance calls.
///
/// Routine mutations never return this; they log persistence failures
/// and keep the in-memory index authoritative.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Writing the index file failed.
    #[error("failed to persist character index: {0}")]
    Persist(#[from] personae_db::DbError),
}
