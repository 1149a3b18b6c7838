//! The character record: an identity plus an opaque per-module data bag.
//!
//! A [`CharacterRecord`] never interprets the contents of its [`DataBag`].
//! Each feature module owns one namespace inside the bag and is the only
//! code that knows what the document stored there means.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CharacterId;

/// Namespaced document storage owned by a single [`CharacterRecord`].
///
/// Keys are feature-module namespaces (for example `"inventory"` or
/// `"location"`); values are arbitrary nested JSON documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataBag {
    entries: BTreeMap<String, Value>,
}

impl DataBag {
    /// Create an empty data bag.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Read the document stored under `namespace`.
    pub fn get(&self, namespace: &str) -> Option<&Value> {
        self.entries.get(namespace)
    }

    /// Mutable access to the document stored under `namespace`.
    pub fn get_mut(&mut self, namespace: &str) -> Option<&mut Value> {
        self.entries.get_mut(namespace)
    }

    /// Return the document under `namespace`, inserting an empty object
    /// first if the namespace is absent.
    pub fn namespace_mut(&mut self, namespace: &str) -> &mut Value {
        self.entries
            .entry(namespace.to_owned())
            .or_insert_with(|| Value::Object(serde_json::Map::new()))
    }

    /// Replace the document under `namespace`, returning the previous one.
    pub fn insert(&mut self, namespace: impl Into<String>, document: Value) -> Option<Value> {
        self.entries.insert(namespace.into(), document)
    }

    /// Remove and return the document under `namespace`.
    pub fn remove(&mut self, namespace: &str) -> Option<Value> {
        self.entries.remove(namespace)
    }

    /// Whether a document is stored under `namespace`.
    pub fn contains(&self, namespace: &str) -> bool {
        self.entries.contains_key(namespace)
    }

    /// Iterate over the namespaces present in the bag, in sorted order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of namespaces stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag holds no documents.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep-merge `document` into the namespace.
    ///
    /// Objects are merged key by key, recursively. Any other value
    /// (including arrays) replaces what was there.
    pub fn merge(&mut self, namespace: &str, document: Value) {
        match self.entries.get_mut(namespace) {
            Some(existing) => merge_value(existing, document),
            None => {
                self.entries.insert(namespace.to_owned(), document);
            }
        }
    }

    /// Deep-merge every namespace of `other` into this bag.
    pub fn merge_all(&mut self, other: Self) {
        for (namespace, document) in other.entries {
            self.merge(&namespace, document);
        }
    }
}

impl FromIterator<(String, Value)> for DataBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

fn merge_value(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// One persona owned by a player.
///
/// The `id` is assigned at creation and never changes. The display name
/// and deceased flag are only changed through
/// [`PlayerCharacterSet`](crate::PlayerCharacterSet) so that the set can
/// keep its active-character invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    id: CharacterId,
    display_name: String,
    #[serde(default)]
    deceased: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    data: DataBag,
}

impl CharacterRecord {
    /// Create a live record with an empty data bag.
    pub fn new(id: CharacterId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            deceased: false,
            created_at: Utc::now(),
            data: DataBag::new(),
        }
    }

    /// The immutable character identifier.
    pub const fn id(&self) -> CharacterId {
        self.id
    }

    /// The display name, with its original casing.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The lower-cased display name used for case-insensitive lookups.
    pub fn name_key(&self) -> String {
        self.display_name.to_lowercase()
    }

    /// Whether the character is deceased.
    pub const fn is_deceased(&self) -> bool {
        self.deceased
    }

    /// When the character was created.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The namespaced data bag.
    pub const fn data(&self) -> &DataBag {
        &self.data
    }

    /// Mutable access to the namespaced data bag.
    pub const fn data_mut(&mut self) -> &mut DataBag {
        &mut self.data
    }

    pub(crate) fn set_display_name(&mut self, name: String) {
        self.display_name = name;
    }

    pub(crate) const fn set_deceased(&mut self, deceased: bool) {
        self.deceased = deceased;
    }
}
