//! Durable per-character file storage with a write-through cache.
//!
//! Each character is stored in its own file, `<characters_dir>/<id>.dat`,
//! using the compressed envelope format from [`crate::codec`].
//!
//! # Concurrency
//!
//! - The cache is a [`DashMap`], so cache hits never take the I/O lock.
//! - A single [`RwLock`] serializes filesystem access: loads share it,
//!   saves and deletes take it exclusively. Cache updates that follow a
//!   filesystem operation happen while the lock is still held, so a slow
//!   load can never overwrite a newer save in the cache.
//!
//! # Failure policy
//!
//! The public contract never propagates errors: `save` and `delete`
//! return `false`, `load` returns `None`, and the failure is logged.
//! Corrupt files are treated as absent.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use parking_lot::RwLock;
use personae_types::{CharacterId, CharacterRecord};
use tracing::{debug, error, warn};

use crate::codec;
use crate::error::DbError;

/// Envelope kind tag for character documents.
pub const CHARACTER_KIND: &str = "character";

/// File extension used for every Personae document.
pub const DOCUMENT_EXTENSION: &str = "dat";

/// File-backed store of [`CharacterRecord`]s.
#[derive(Debug)]
pub struct CharacterStore {
    dir: PathBuf,
    cache: DashMap<CharacterId, CharacterRecord>,
    io_lock: RwLock<()>,
}

impl CharacterStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DbError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| DbError::io(&dir, e))?;
        debug!(dir = %dir.display(), "Character store opened");
        Ok(Self {
            dir,
            cache: DashMap::new(),
            io_lock: RwLock::new(()),
        })
    }

    /// The directory holding character files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file path for a character id.
    pub fn path_for(&self, id: CharacterId) -> PathBuf {
        self.dir.join(format!("{id}.{DOCUMENT_EXTENSION}"))
    }

    /// Persist `record`, replacing any previous file, and refresh the cache.
    ///
    /// Returns `false` (after logging) if the write failed. The cache is
    /// only updated when the write succeeded.
    pub fn save(&self, record: &CharacterRecord) -> bool {
        match self.try_save(record) {
            Ok(()) => true,
            Err(e) => {
                error!(character_id = %record.id(), error = %e, "Failed to save character");
                false
            }
        }
    }

    /// Persist `record`, propagating the failure.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if encoding or writing fails.
    pub fn try_save(&self, record: &CharacterRecord) -> Result<(), DbError> {
        let path = self.path_for(record.id());
        let _guard = self.io_lock.write();
        codec::write_document(&path, CHARACTER_KIND, record)?;
        self.cache.insert(record.id(), record.clone());
        debug!(character_id = %record.id(), "Saved character");
        Ok(())
    }

    /// Load a record, from the cache if present, otherwise from disk.
    ///
    /// Returns `None` if the file does not exist or cannot be decoded.
    pub fn load(&self, id: CharacterId) -> Option<CharacterRecord> {
        if let Some(cached) = self.cache.get(&id) {
            return Some(cached.clone());
        }

        let path = self.path_for(id);
        let _guard = self.io_lock.read();
        match codec::read_document::<CharacterRecord>(&path, CHARACTER_KIND) {
            Ok(Some(record)) if record.id() == id => {
                self.cache.insert(id, record.clone());
                Some(record)
            }
            Ok(Some(record)) => {
                warn!(
                    character_id = %id,
                    found_id = %record.id(),
                    "Character file holds a different id, treating as absent"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(character_id = %id, error = %e, "Corrupt character file, treating as absent");
                None
            }
        }
    }

    /// Remove a record from the cache and from disk.
    ///
    /// Returns `true` if the file is gone afterwards, including when it
    /// never existed.
    pub fn delete(&self, id: CharacterId) -> bool {
        match self.try_delete(id) {
            Ok(()) => true,
            Err(e) => {
                error!(character_id = %id, error = %e, "Failed to delete character file");
                false
            }
        }
    }

    /// Remove a record, propagating the failure.
    ///
    /// The cache entry is dropped only once the file is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the file exists and cannot be removed.
    pub fn try_delete(&self, id: CharacterId) -> Result<(), DbError> {
        let path = self.path_for(id);
        let _guard = self.io_lock.write();
        codec::remove_document(&path)?;
        self.cache.remove(&id);
        debug!(character_id = %id, "Deleted character file");
        Ok(())
    }

    /// Whether a record is cached or present on disk.
    pub fn exists(&self, id: CharacterId) -> bool {
        if self.cache.contains_key(&id) {
            return true;
        }
        let _guard = self.io_lock.read();
        self.path_for(id).is_file()
    }

    /// Drop a single entry from the cache without touching disk.
    pub fn evict(&self, id: CharacterId) {
        self.cache.remove(&id);
    }

    /// Drop every cached entry without touching disk.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of cached records.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Ids of every character file on disk.
    ///
    /// Files whose stem is not a character id are ignored.
    pub fn list_ids(&self) -> Vec<CharacterId> {
        let _guard = self.io_lock.read();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to list character files");
                return Vec::new();
            }
        };

        let mut ids: Vec<CharacterId> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == DOCUMENT_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(CharacterId::parse)
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}
