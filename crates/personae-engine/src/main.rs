//! Personae server binary.
//!
//! Wires the character lifecycle services together and drives them from
//! an operator console on stdin.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `personae-config.yaml` (or the path given as
//!    the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Open the identity registry from the index file
//! 4. Open the character and player stores
//! 5. Create the peer push channel and its logger
//! 6. Build the switch coordinator
//! 7. Run the console until `quit` or end of input
//! 8. Disconnect every player and flush the index

mod console;
mod error;
mod peer;

use std::path::PathBuf;
use std::sync::Arc;

use personae_core::{PeerSync, PersonaeConfig, SwitchCoordinator};
use personae_db::{CharacterStore, PlayerStateStore};
use personae_registry::IdentityRegistry;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::peer::BroadcastPeerSync;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "personae-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, storage, or the final flush fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging is not up yet, so the outcome is
    //    reported once it is.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, config_found) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("personae-engine starting");
    if !config_found {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        data_dir = %config.storage.data_dir.display(),
        max_per_player = config.characters.max_per_player,
        switch_cooldown_secs = config.characters.switch_cooldown_secs,
        barrier_timeout_ms = config.characters.barrier_timeout_ms,
        allow_deletion = config.characters.allow_deletion,
        "Configuration loaded"
    );

    // 3. Identity registry.
    let registry = Arc::new(IdentityRegistry::open(config.storage.index_path()));

    // 4. Stores.
    let store = Arc::new(CharacterStore::open(config.storage.characters_path())?);
    let players = Arc::new(PlayerStateStore::open(config.storage.players_path())?);
    info!(
        characters_dir = %store.dir().display(),
        players_dir = %players.dir().display(),
        "Stores opened"
    );

    // 5. Peer push channel.
    let peer = BroadcastPeerSync::new();
    let push_logger = tokio::spawn(peer::log_pushes(peer.subscribe()));
    let peer_sync: Arc<dyn PeerSync> = Arc::new(peer);

    // 6. Coordinator.
    let coordinator = SwitchCoordinator::new(&config, registry, store, players, peer_sync)?;
    info!("Coordinator ready");

    // 7. Console.
    let console_result = console::run(&coordinator).await;

    // 8. Shutdown runs even if the console failed.
    coordinator.shutdown().await?;
    drop(coordinator);
    push_logger.abort();
    console_result?;

    info!("personae-engine stopped");
    Ok(())
}

/// Load configuration from `path`, falling back to defaults if it does not
/// exist. The flag reports whether the file was found.
fn load_config(path: &std::path::Path) -> Result<(PersonaeConfig, bool), EngineError> {
    if path.exists() {
        Ok((PersonaeConfig::from_file(path)?, true))
    } else {
        Ok((PersonaeConfig::parse("")?, false))
    }
}
