//! Propagation of a player's character state to remote peers.

use personae_types::{CharacterSetSync, PlayerId};

/// Pushes full character state to a remote peer.
///
/// Delivery is assumed reliable and ordered. Receivers replace what they
/// hold with any payload whose revision is not older.
pub trait PeerSync: Send + Sync {
    /// Send `state` to `destination`.
    fn push_state(&self, state: &CharacterSetSync, destination: PlayerId);
}

/// A peer sync that discards every push.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPeerSync;

impl PeerSync for NoopPeerSync {
    fn push_state(&self, _state: &CharacterSetSync, _destination: PlayerId) {}
}
