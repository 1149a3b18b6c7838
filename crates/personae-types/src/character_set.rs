//! A player's owned characters and the pointer to the active one.
//!
//! # Invariant
//!
//! If `active` is `Some(id)`, then `id` is a key of `characters` and that
//! record is not deceased. Every mutating method preserves this; the only
//! way to point at a character is [`PlayerCharacterSet::set_active`], which
//! rejects unknown and deceased targets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, PlayerId};
use crate::record::CharacterRecord;
use crate::sync::CharacterSummary;

/// Errors returned when a mutation would break the set's invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CharacterSetError {
    /// The character is not owned by this player.
    #[error("character {0} is not owned by this player")]
    UnknownCharacter(CharacterId),

    /// The character is deceased and cannot be active.
    #[error("character {0} is deceased")]
    Deceased(CharacterId),

    /// The character is active and must be switched away from first.
    #[error("character {0} is currently active")]
    Active(CharacterId),

    /// A record with this id is already in the set.
    #[error("character {0} is already owned by this player")]
    Duplicate(CharacterId),
}

/// All characters owned by one player, plus the active pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCharacterSet {
    player_id: PlayerId,
    active: Option<CharacterId>,
    characters: BTreeMap<CharacterId, CharacterRecord>,
}

impl PlayerCharacterSet {
    /// Create an empty set with no active character.
    pub const fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            active: None,
            characters: BTreeMap::new(),
        }
    }

    /// The owning player.
    pub const fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// The active character id, if any.
    pub const fn active_id(&self) -> Option<CharacterId> {
        self.active
    }

    /// The active character record, if any.
    pub fn active(&self) -> Option<&CharacterRecord> {
        self.active.and_then(|id| self.characters.get(&id))
    }

    /// Whether `id` is the active character.
    pub fn is_active(&self, id: CharacterId) -> bool {
        self.active == Some(id)
    }

    /// Point the set at `target`, or at nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CharacterSetError::UnknownCharacter`] if the target is not
    /// owned, or [`CharacterSetError::Deceased`] if it is deceased.
    pub fn set_active(&mut self, target: Option<CharacterId>) -> Result<(), CharacterSetError> {
        if let Some(id) = target {
            let record = self
                .characters
                .get(&id)
                .ok_or(CharacterSetError::UnknownCharacter(id))?;
            if record.is_deceased() {
                return Err(CharacterSetError::Deceased(id));
            }
        }
        self.active = target;
        Ok(())
    }

    /// Look up a record by id.
    pub fn get(&self, id: CharacterId) -> Option<&CharacterRecord> {
        self.characters.get(&id)
    }

    /// Mutable access to a record by id.
    ///
    /// Only the data bag can be changed through the returned reference;
    /// names and the deceased flag go through [`rename`](Self::rename) and
    /// [`set_deceased`](Self::set_deceased).
    pub fn get_mut(&mut self, id: CharacterId) -> Option<&mut CharacterRecord> {
        self.characters.get_mut(&id)
    }

    /// Whether the player owns `id`.
    pub fn contains(&self, id: CharacterId) -> bool {
        self.characters.contains_key(&id)
    }

    /// Add a record to the set.
    ///
    /// # Errors
    ///
    /// Returns [`CharacterSetError::Duplicate`] if the id is already present.
    pub fn insert(&mut self, record: CharacterRecord) -> Result<(), CharacterSetError> {
        let id = record.id();
        if self.characters.contains_key(&id) {
            return Err(CharacterSetError::Duplicate(id));
        }
        self.characters.insert(id, record);
        Ok(())
    }

    /// Remove a record. Removing the active record clears the active pointer.
    pub fn remove(&mut self, id: CharacterId) -> Option<CharacterRecord> {
        let removed = self.characters.remove(&id);
        if removed.is_some() && self.active == Some(id) {
            self.active = None;
        }
        removed
    }

    /// Change the display name of an owned record.
    ///
    /// Returns the previous name.
    ///
    /// # Errors
    ///
    /// Returns [`CharacterSetError::UnknownCharacter`] if the id is not owned.
    pub fn rename(
        &mut self,
        id: CharacterId,
        name: impl Into<String>,
    ) -> Result<String, CharacterSetError> {
        let record = self
            .characters
            .get_mut(&id)
            .ok_or(CharacterSetError::UnknownCharacter(id))?;
        let previous = record.display_name().to_owned();
        record.set_display_name(name.into());
        Ok(previous)
    }

    /// Mark or unmark a record as deceased.
    ///
    /// # Errors
    ///
    /// Returns [`CharacterSetError::UnknownCharacter`] if the id is not
    /// owned, or [`CharacterSetError::Active`] when marking the active
    /// character deceased. Callers switch away first.
    pub fn set_deceased(&mut self, id: CharacterId, deceased: bool) -> Result<(), CharacterSetError> {
        if deceased && self.active == Some(id) {
            return Err(CharacterSetError::Active(id));
        }
        let record = self
            .characters
            .get_mut(&id)
            .ok_or(CharacterSetError::UnknownCharacter(id))?;
        record.set_deceased(deceased);
        Ok(())
    }

    /// Resolve user input to an owned character.
    ///
    /// Tries to parse the input as an id first, then falls back to a
    /// case-insensitive exact name match.
    pub fn resolve(&self, name_or_id: &str) -> Option<CharacterId> {
        if let Some(id) = CharacterId::parse(name_or_id) {
            if self.characters.contains_key(&id) {
                return Some(id);
            }
        }
        let wanted = name_or_id.to_lowercase();
        self.characters
            .values()
            .find(|record| record.name_key() == wanted)
            .map(CharacterRecord::id)
    }

    /// Pick the character to fall back to when `excluded` stops being usable.
    ///
    /// Returns the live character (other than `excluded`) whose lower-cased
    /// name sorts first, or `None` if there is none.
    pub fn fallback_candidate(&self, excluded: CharacterId) -> Option<CharacterId> {
        self.characters
            .values()
            .filter(|record| record.id() != excluded && !record.is_deceased())
            .min_by_key(|record| (record.name_key(), record.id()))
            .map(CharacterRecord::id)
    }

    /// Number of owned characters, deceased ones included.
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    /// Whether the player owns no characters.
    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Iterate over owned records in id order.
    pub fn iter(&self) -> impl Iterator<Item = &CharacterRecord> {
        self.characters.values()
    }

    /// Ids of every owned character.
    pub fn ids(&self) -> Vec<CharacterId> {
        self.characters.keys().copied().collect()
    }

    /// Summaries of every owned character, sorted by lower-cased name.
    pub fn summaries(&self) -> Vec<CharacterSummary> {
        let mut summaries: Vec<CharacterSummary> = self
            .characters
            .values()
            .map(|record| CharacterSummary {
                id: record.id(),
                name: record.display_name().to_owned(),
                deceased: record.is_deceased(),
                active: self.active == Some(record.id()),
            })
            .collect();
        summaries.sort_by_key(|summary| summary.name.to_lowercase());
        summaries
    }
}
