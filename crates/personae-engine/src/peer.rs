//! Peer push over a broadcast channel.
//!
//! [`BroadcastPeerSync`] fans every pushed [`CharacterSetSync`] out to all
//! subscribers. A transport (or, here, the push logger) subscribes and
//! delivers the payload to the destination peer.

use personae_core::PeerSync;
use personae_types::{CharacterSetSync, PlayerId};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the peer broadcast channel.
///
/// A subscriber that falls behind by more than this many messages
/// receives [`broadcast::error::RecvError::Lagged`] and skips ahead.
const BROADCAST_CAPACITY: usize = 256;

/// One state push addressed to a peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerMessage {
    /// The player whose peer should receive the state.
    pub destination: PlayerId,
    /// The full character state.
    pub state: CharacterSetSync,
}

/// A [`PeerSync`] backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastPeerSync {
    tx: broadcast::Sender<PeerMessage>,
}

impl BroadcastPeerSync {
    /// Create a channel with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// Subscribe to every future push.
    pub fn subscribe(&self) -> broadcast::Receiver<PeerMessage> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPeerSync {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSync for BroadcastPeerSync {
    fn push_state(&self, state: &CharacterSetSync, destination: PlayerId) {
        let message = PeerMessage {
            destination,
            state: state.clone(),
        };
        match self.tx.send(message) {
            Ok(receivers) => {
                debug!(player_id = %destination, revision = state.revision, receivers, "Peer push sent");
            }
            Err(_) => {
                debug!(player_id = %destination, revision = state.revision, "Peer push dropped, no subscribers");
            }
        }
    }
}

/// Log every push as JSON until the channel closes.
pub async fn log_pushes(mut rx: broadcast::Receiver<PeerMessage>) {
    loop {
        match rx.recv().await {
            Ok(message) => match serde_json::to_string(&message) {
                Ok(payload) => debug!(player_id = %message.destination, payload = %payload, "Peer state"),
                Err(e) => warn!(player_id = %message.destination, error = %e, "Failed to encode peer state"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Peer push logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
