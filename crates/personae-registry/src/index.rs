//! On-disk shape of the global index file.
//!
//! The index is stored as two flat tables so that it stays readable when
//! decompressed by hand: `(character_id, owner_id)` pairs and
//! `(name, character_id)` pairs. Both are written sorted so that an
//! unchanged registry always produces an identical file.

use serde::{Deserialize, Serialize};

use personae_types::{CharacterId, PlayerId};

/// Envelope kind tag for the index document.
pub const INDEX_KIND: &str = "character-index";

/// One ownership binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerEntry {
    /// The character.
    pub character_id: CharacterId,
    /// The player that owns it.
    pub owner_id: PlayerId,
}

/// One name binding. `name` is stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameEntry {
    /// Lower-cased display name.
    pub name: String,
    /// The character the name resolves to.
    pub character_id: CharacterId,
}

/// The complete index document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    /// Every ownership binding.
    #[serde(default)]
    pub owners: Vec<OwnerEntry>,
    /// Every name binding.
    #[serde(default)]
    pub names: Vec<NameEntry>,
}
