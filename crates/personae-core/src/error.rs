//! Error types for coordinator operations.

use std::time::Duration;

use personae_db::DbError;
use personae_types::{CharacterId, CharacterSetError, PlayerId};

use crate::names::NameError;

/// Broad class of a [`CoordinatorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was refused; nothing changed.
    Validation,
    /// A player, character, or active character was missing.
    NotFound,
    /// The caller's own data could not be durably saved.
    Persistence,
}

/// Errors returned by [`SwitchCoordinator`](crate::SwitchCoordinator).
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The requested name breaks a naming rule.
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// Another character already holds the name.
    #[error("name '{name}' is already taken")]
    NameTaken {
        /// The requested name.
        name: String,
    },

    /// The player owns the maximum number of characters.
    #[error("character limit of {limit} reached")]
    CharacterLimitReached {
        /// The configured limit.
        limit: u32,
    },

    /// The target character is deceased.
    #[error("character '{name}' is deceased")]
    Deceased {
        /// Display name of the target.
        name: String,
    },

    /// The target character is already active.
    #[error("character '{name}' is already active")]
    AlreadyActive {
        /// Display name of the target.
        name: String,
    },

    /// The player switched too recently.
    #[error("switch is on cooldown for another {}s", whole_seconds(*remaining))]
    CooldownActive {
        /// Time left before the next switch is allowed.
        remaining: Duration,
    },

    /// The active character cannot be deleted.
    #[error("cannot delete active character '{name}'; switch away first")]
    CannotDeleteActive {
        /// Display name of the target.
        name: String,
    },

    /// Character deletion is turned off.
    #[error("character deletion is disabled")]
    DeletionDisabled,

    /// A feature module refused the deletion.
    #[error("deletion vetoed by {module}: {reason}")]
    DeletionVetoed {
        /// The vetoing module.
        module: String,
        /// The module's reason.
        reason: String,
    },

    /// No owned character matches the given name or id.
    #[error("no character named '{target}'")]
    CharacterNotFound {
        /// The name or id that was looked up.
        target: String,
    },

    /// The player has no live session.
    #[error("player {player} is not connected")]
    PlayerNotConnected {
        /// The player.
        player: PlayerId,
    },

    /// The operation needs an active character and there is none.
    #[error("player {player} has no active character")]
    NoActiveCharacter {
        /// The player.
        player: PlayerId,
    },

    /// A character file could not be written or removed.
    #[error("failed to persist character {character_id}: {source}")]
    Persistence {
        /// The character whose file failed.
        character_id: CharacterId,
        /// The underlying storage error.
        source: DbError,
    },

    /// The player's character set refused a change.
    #[error(transparent)]
    CharacterSet(#[from] CharacterSetError),
}

impl CoordinatorError {
    /// The broad class of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CharacterNotFound { .. }
            | Self::PlayerNotConnected { .. }
            | Self::NoActiveCharacter { .. }
            | Self::CharacterSet(CharacterSetError::UnknownCharacter(_)) => ErrorKind::NotFound,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::InvalidName(_)
            | Self::NameTaken { .. }
            | Self::CharacterLimitReached { .. }
            | Self::Deceased { .. }
            | Self::AlreadyActive { .. }
            | Self::CooldownActive { .. }
            | Self::CannotDeleteActive { .. }
            | Self::DeletionDisabled
            | Self::DeletionVetoed { .. }
            | Self::CharacterSet(_) => ErrorKind::Validation,
        }
    }
}

/// Round a duration up to whole seconds for display.
fn whole_seconds(duration: Duration) -> u64 {
    let partial = u64::from(duration.subsec_nanos() > 0);
    duration.as_secs().saturating_add(partial)
}
