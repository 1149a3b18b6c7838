//! Full-state payloads pushed to remote peers.
//!
//! The receiving side applies a [`CharacterSetSync`] by replacing whatever
//! it had for that player, keeping only the highest `revision` it has seen.

use serde::{Deserialize, Serialize};

use crate::character_set::PlayerCharacterSet;
use crate::ids::{CharacterId, PlayerId};

/// A lightweight view of one character, safe to send to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSummary {
    /// The character id.
    pub id: CharacterId,
    /// Display name with original casing.
    pub name: String,
    /// Whether the character is deceased.
    pub deceased: bool,
    /// Whether this is the player's active character.
    pub active: bool,
}

/// The complete character state of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSetSync {
    /// The player this state belongs to.
    pub player_id: PlayerId,
    /// The active character, if any.
    pub active_character_id: Option<CharacterId>,
    /// Every owned character, sorted by name.
    pub characters: Vec<CharacterSummary>,
    /// Per-player revision counter; higher wins on the receiver.
    pub revision: u64,
}

impl CharacterSetSync {
    /// Build a payload from a character set.
    pub fn from_set(set: &PlayerCharacterSet, revision: u64) -> Self {
        Self {
            player_id: set.player_id(),
            active_character_id: set.active_id(),
            characters: set.summaries(),
            revision,
        }
    }

    /// Whether this payload should replace `current` on the receiver.
    pub fn supersedes(&self, current: Option<&Self>) -> bool {
        current.is_none_or(|current| {
            current.player_id != self.player_id || self.revision >= current.revision
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::CharacterRecord;

    #[test]
    fn from_set_captures_active_pointer() {
        let mut set = PlayerCharacterSet::new(PlayerId::new());
        let id = CharacterId::new();
        set.insert(CharacterRecord::new(id, "Aria")).unwrap();
        set.set_active(Some(id)).unwrap();

        let sync = CharacterSetSync::from_set(&set, 4);
        assert_eq!(sync.active_character_id, Some(id));
        assert_eq!(sync.characters.len(), 1);
        assert_eq!(sync.revision, 4);
    }

    #[test]
    fn newer_revision_supersedes_older() {
        let set = PlayerCharacterSet::new(PlayerId::new());
        let old = CharacterSetSync::from_set(&set, 1);
        let new = CharacterSetSync::from_set(&set, 2);
        assert!(new.supersedes(Some(&old)));
        assert!(!old.supersedes(Some(&new)));
        assert!(old.supersedes(None));
    }
}
