//! Configuration loading and typed config structures for Personae.
//!
//! The canonical configuration lives in `personae-config.yaml` next to the
//! server binary. This module defines strongly-typed structs that mirror
//! the YAML structure, and provides a loader that reads and validates the
//! file. Every field has a default, so an empty file is a valid config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use personae_types::DataBag;
use serde::Deserialize;

/// Environment variable that overrides `storage.data_dir`.
pub const DATA_DIR_ENV: &str = "PERSONAE_DATA_DIR";

/// Smallest accepted pre-switch barrier timeout.
pub const MIN_BARRIER_TIMEOUT_MS: u64 = 1_000;

/// Largest accepted pre-switch barrier timeout.
pub const MAX_BARRIER_TIMEOUT_MS: u64 = 5_000;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configured name pattern is not a valid regular expression.
    #[error("invalid name pattern: {source}")]
    NamePattern {
        /// The underlying regex error.
        #[from]
        source: regex::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level Personae configuration.
///
/// Mirrors the structure of `personae-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PersonaeConfig {
    /// Where documents are stored.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Character name rules.
    #[serde(default)]
    pub names: NamesConfig,

    /// Character limits, cooldowns, and switch protocol settings.
    #[serde(default)]
    pub characters: CharactersConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PersonaeConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `PERSONAE_DATA_DIR` overrides `storage.data_dir` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.storage.apply_env_overrides();
        Ok(config)
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all documents.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Sub-directory (of `data_dir`) holding one file per character.
    #[serde(default = "default_characters_dir")]
    pub characters_dir: String,

    /// Sub-directory (of `data_dir`) holding one file per player.
    #[serde(default = "default_players_dir")]
    pub players_dir: String,

    /// File name (in `data_dir`) of the global character index.
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

impl StorageConfig {
    /// Full path of the characters directory.
    pub fn characters_path(&self) -> PathBuf {
        self.data_dir.join(&self.characters_dir)
    }

    /// Full path of the players directory.
    pub fn players_path(&self) -> PathBuf {
        self.data_dir.join(&self.players_dir)
    }

    /// Full path of the global index file.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            characters_dir: default_characters_dir(),
            players_dir: default_players_dir(),
            index_file: default_index_file(),
        }
    }
}

/// Character name rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamesConfig {
    /// Minimum name length in characters.
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Maximum name length in characters.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Regular expression every name must match in full.
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Words that may not appear anywhere in a name (case-insensitive).
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,

    /// Words that legitimise a blacklisted substring they contain.
    #[serde(default)]
    pub overrides: Vec<String>,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            pattern: default_pattern(),
            blacklist: default_blacklist(),
            overrides: Vec::new(),
        }
    }
}

/// Character limits and switch protocol settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CharactersConfig {
    /// Maximum characters per player, deceased ones included (0 = unlimited).
    #[serde(default = "default_max_per_player")]
    pub max_per_player: u32,

    /// Seconds a player must wait between requested switches.
    #[serde(default = "default_switch_cooldown_secs")]
    pub switch_cooldown_secs: u64,

    /// Whether players may delete their characters.
    #[serde(default = "default_true")]
    pub allow_deletion: bool,

    /// Milliseconds to wait for feature modules at the pre-switch barrier.
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,

    /// Documents merged into the data bag of every new character.
    #[serde(default)]
    pub starting_data: BTreeMap<String, serde_json::Value>,
}

impl CharactersConfig {
    /// The switch cooldown as a [`Duration`].
    pub const fn switch_cooldown(&self) -> Duration {
        Duration::from_secs(self.switch_cooldown_secs)
    }

    /// The barrier timeout, clamped to the supported range.
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(
            self.barrier_timeout_ms
                .clamp(MIN_BARRIER_TIMEOUT_MS, MAX_BARRIER_TIMEOUT_MS),
        )
    }

    /// The starting data as a [`DataBag`].
    pub fn starting_bag(&self) -> DataBag {
        self.starting_data
            .iter()
            .map(|(namespace, document)| (namespace.clone(), document.clone()))
            .collect()
    }
}

impl Default for CharactersConfig {
    fn default() -> Self {
        Self {
            max_per_player: default_max_per_player(),
            switch_cooldown_secs: default_switch_cooldown_secs(),
            allow_deletion: true,
            barrier_timeout_ms: default_barrier_timeout_ms(),
            starting_data: BTreeMap::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde's `default = "..."` attribute)
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_characters_dir() -> String {
    "characters".to_owned()
}

fn default_players_dir() -> String {
    "players".to_owned()
}

fn default_index_file() -> String {
    "character-index.dat".to_owned()
}

const fn default_min_length() -> usize {
    3
}

const fn default_max_length() -> usize {
    32
}

fn default_pattern() -> String {
    "^[A-Za-z0-9_ '-]+$".to_owned()
}

fn default_blacklist() -> Vec<String> {
    vec![
        "admin".to_owned(),
        "moderator".to_owned(),
        "console".to_owned(),
    ]
}

const fn default_max_per_player() -> u32 {
    3
}

const fn default_switch_cooldown_secs() -> u64 {
    30
}

const fn default_barrier_timeout_ms() -> u64 {
    3_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
