//! The process-wide identity registry.
//!
//! [`IdentityRegistry`] maps every character to its owning player and
//! every lower-cased display name to the character holding it. Name
//! uniqueness is a check-then-set across all players, so every mutation
//! runs under the exclusive side of a single reader/writer lock while
//! lookups share the read side.
//!
//! # Invariants
//!
//! - Every name binding points at a character that has an owner.
//! - A character holds at most one name binding at a time.
//! - Names compare case-insensitively; the registry never stores the
//!   display casing (the record does).
//!
//! # Durability
//!
//! After each successful mutation the full index is written to disk
//! before the lock is released. A failed write is logged and the
//! in-memory index stays authoritative for the rest of the session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use personae_db::codec;
use personae_types::{CharacterId, PlayerId};
use tracing::{debug, error, info, warn};

use crate::RegistryError;
use crate::index::{INDEX_KIND, IndexDocument, NameEntry, OwnerEntry};

#[derive(Debug, Default)]
struct IndexState {
    owners: HashMap<CharacterId, PlayerId>,
    names: HashMap<String, CharacterId>,
    name_of: HashMap<CharacterId, String>,
}

impl IndexState {
    fn from_document(document: IndexDocument) -> Self {
        let mut state = Self::default();
        for entry in document.owners {
            state.owners.insert(entry.character_id, entry.owner_id);
        }
        for entry in document.names {
            let key = entry.name.to_lowercase();
            if !state.owners.contains_key(&entry.character_id) {
                warn!(
                    name = key,
                    character_id = %entry.character_id,
                    "Dropping name binding for unowned character"
                );
                continue;
            }
            if state.name_of.contains_key(&entry.character_id) || state.names.contains_key(&key) {
                warn!(
                    name = key,
                    character_id = %entry.character_id,
                    "Dropping duplicate name binding"
                );
                continue;
            }
            state.bind(key, entry.character_id);
        }
        state
    }

    fn to_document(&self) -> IndexDocument {
        let mut owners: Vec<OwnerEntry> = self
            .owners
            .iter()
            .map(|(&character_id, &owner_id)| OwnerEntry {
                character_id,
                owner_id,
            })
            .collect();
        owners.sort_unstable();

        let mut names: Vec<NameEntry> = self
            .names
            .iter()
            .map(|(name, &character_id)| NameEntry {
                name: name.clone(),
                character_id,
            })
            .collect();
        names.sort_unstable();

        IndexDocument { owners, names }
    }

    fn bind(&mut self, key: String, id: CharacterId) {
        if let Some(previous) = self.name_of.insert(id, key.clone()) {
            if previous != key {
                self.names.remove(&previous);
            }
        }
        self.names.insert(key, id);
    }

    fn unbind_id(&mut self, id: CharacterId) {
        if let Some(key) = self.name_of.remove(&id) {
            self.names.remove(&key);
        }
    }
}

/// Global index of character ownership and names.
#[derive(Debug)]
pub struct IdentityRegistry {
    state: RwLock<IndexState>,
    index_path: Option<PathBuf>,
}

impl IdentityRegistry {
    /// Create an empty registry that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            index_path: None,
        }
    }

    /// Rebuild the registry from the index file at `path`.
    ///
    /// A missing or corrupt file yields an empty registry (logged); it
    /// never fails startup. Later mutations are written back to `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match codec::read_document::<IndexDocument>(&path, INDEX_KIND) {
            Ok(Some(document)) => IndexState::from_document(document),
            Ok(None) => {
                info!(path = %path.display(), "No character index found, starting empty");
                IndexState::default()
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Character index is unreadable, starting empty"
                );
                IndexState::default()
            }
        };
        info!(
            characters = state.owners.len(),
            names = state.names.len(),
            "Identity registry loaded"
        );
        Self {
            state: RwLock::new(state),
            index_path: Some(path),
        }
    }

    /// The index file this registry persists to, if any.
    pub fn index_path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    /// Bind `name` to `id` and record `owner` as its owner.
    ///
    /// Fails (returns `false`) only if the name is already bound to a
    /// different character. Registering a character under the name it
    /// already holds succeeds. If the character held another name, that
    /// binding is released.
    pub fn register(&self, id: CharacterId, owner: PlayerId, name: &str) -> bool {
        let key = name.to_lowercase();
        let mut state = self.state.write();
        if state.names.get(&key).is_some_and(|&holder| holder != id) {
            debug!(name = key, character_id = %id, "Name already taken");
            return false;
        }
        state.owners.insert(id, owner);
        state.bind(key, id);
        self.persist(&state);
        debug!(character_id = %id, owner_id = %owner, name, "Registered character");
        true
    }

    /// Move `id` from `old_name` to `new_name` in one step.
    ///
    /// Fails if `old_name` does not currently resolve to `id`, or if
    /// `new_name` resolves to a different character. No reader ever sees
    /// the old name released without the new one taken.
    pub fn update_name(&self, id: CharacterId, old_name: &str, new_name: &str) -> bool {
        let old_key = old_name.to_lowercase();
        let new_key = new_name.to_lowercase();
        let mut state = self.state.write();
        if state.names.get(&old_key) != Some(&id) {
            debug!(character_id = %id, old_name = old_key, "Old name does not belong to character");
            return false;
        }
        if state.names.get(&new_key).is_some_and(|&holder| holder != id) {
            debug!(character_id = %id, new_name = new_key, "New name already taken");
            return false;
        }
        state.bind(new_key, id);
        self.persist(&state);
        debug!(character_id = %id, old_name, new_name, "Renamed character");
        true
    }

    /// Remove `id` from the registry.
    ///
    /// The `name` binding is removed only if it still points at `id`; the
    /// ownership binding and whatever name `id` currently holds are always
    /// removed. Absent bindings are not an error.
    pub fn unregister(&self, id: CharacterId, name: &str) {
        let key = name.to_lowercase();
        let mut state = self.state.write();
        let mut changed = false;
        if state.names.get(&key) == Some(&id) {
            state.names.remove(&key);
            changed = true;
        }
        if state.name_of.contains_key(&id) {
            state.unbind_id(id);
            changed = true;
        }
        if state.owners.remove(&id).is_some() {
            changed = true;
        }
        if changed {
            self.persist(&state);
            debug!(character_id = %id, name, "Unregistered character");
        }
    }

    /// Whether any character holds `name` (case-insensitive).
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.state.read().names.contains_key(&name.to_lowercase())
    }

    /// The owner of `id`, if registered.
    pub fn owner_of(&self, id: CharacterId) -> Option<PlayerId> {
        self.state.read().owners.get(&id).copied()
    }

    /// The character holding `name` (case-insensitive), if any.
    pub fn character_id_for_name(&self, name: &str) -> Option<CharacterId> {
        self.state.read().names.get(&name.to_lowercase()).copied()
    }

    /// The lower-cased name `id` is registered under, if any.
    pub fn name_of(&self, id: CharacterId) -> Option<String> {
        self.state.read().name_of.get(&id).cloned()
    }

    /// Every character owned by `owner`, sorted by id.
    pub fn characters_of(&self, owner: PlayerId) -> Vec<CharacterId> {
        let mut ids: Vec<CharacterId> = self
            .state
            .read()
            .owners
            .iter()
            .filter(|&(_, &holder)| holder == owner)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered characters.
    pub fn len(&self) -> usize {
        self.state.read().owners.len()
    }

    /// Whether no characters are registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().owners.is_empty()
    }

    /// Write the current index to disk.
    ///
    /// Mutations already flush; this is for shutdown and tests. The
    /// exclusive lock is held for the write, so a flush never shares the
    /// temp file with a concurrent mutation or another flush.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Persist`] if the write fails.
    pub fn flush(&self) -> Result<(), RegistryError> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };
        codec::write_document(path, INDEX_KIND, &self.state.write().to_document())?;
        Ok(())
    }

    fn persist(&self, state: &IndexState) {
        let Some(path) = &self.index_path else {
            return;
        };
        if let Err(e) = codec::write_document(path, INDEX_KIND, &state.to_document()) {
            error!(
                path = %path.display(),
                error = %e,
                "Failed to persist character index; in-memory index remains authoritative"
            );
        }
    }
}
