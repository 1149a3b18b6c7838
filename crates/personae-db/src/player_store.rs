//! Per-player session state files.
//!
//! A player's [`PlayerState`] records which character was active when the
//! player was last seen and when they last switched, so that a reconnect
//! restores the same persona. Files live at `<players_dir>/<id>.dat`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use personae_types::{CharacterId, PlayerId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::character_store::DOCUMENT_EXTENSION;
use crate::codec;
use crate::error::DbError;

/// Envelope kind tag for player documents.
pub const PLAYER_KIND: &str = "player";

/// Persisted per-player session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// The character that was active when the state was saved.
    #[serde(default)]
    pub active_character_id: Option<CharacterId>,
    /// Wall-clock time of the last player-requested switch. Automatic
    /// activations and fallbacks leave it unchanged.
    #[serde(default)]
    pub last_switch_at: Option<DateTime<Utc>>,
}

/// File-backed store of [`PlayerState`] documents.
#[derive(Debug)]
pub struct PlayerStateStore {
    dir: PathBuf,
    io_lock: Mutex<()>,
}

impl PlayerStateStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DbError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| DbError::io(&dir, e))?;
        Ok(Self {
            dir,
            io_lock: Mutex::new(()),
        })
    }

    /// The directory holding player files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, player: PlayerId) -> PathBuf {
        self.dir.join(format!("{player}.{DOCUMENT_EXTENSION}"))
    }

    /// Load a player's state. Missing or corrupt files yield the default.
    pub fn load(&self, player: PlayerId) -> PlayerState {
        let path = self.path_for(player);
        let _guard = self.io_lock.lock();
        match codec::read_document::<PlayerState>(&path, PLAYER_KIND) {
            Ok(Some(state)) => state,
            Ok(None) => PlayerState::default(),
            Err(e) => {
                warn!(player_id = %player, error = %e, "Corrupt player file, using defaults");
                PlayerState::default()
            }
        }
    }

    /// Persist a player's state. Returns `false` (after logging) on failure.
    pub fn save(&self, player: PlayerId, state: &PlayerState) -> bool {
        let path = self.path_for(player);
        let _guard = self.io_lock.lock();
        match codec::write_document(&path, PLAYER_KIND, state) {
            Ok(()) => {
                debug!(player_id = %player, "Saved player state");
                true
            }
            Err(e) => {
                error!(player_id = %player, error = %e, "Failed to save player state");
                false
            }
        }
    }
}
