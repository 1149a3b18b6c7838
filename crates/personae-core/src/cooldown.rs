//! Per-player switch cooldowns.
//!
//! Cooldowns are measured on the tokio clock so tests can pause and advance
//! time. They are process-local: a restart clears every cooldown.

use std::time::Duration;

use dashmap::DashMap;
use personae_types::PlayerId;
use tokio::time::Instant;

/// Tracks when each player last completed a requested switch.
#[derive(Debug)]
pub struct CooldownTracker {
    period: Duration,
    last_switch: DashMap<PlayerId, Instant>,
}

impl CooldownTracker {
    /// Create a tracker enforcing `period` between switches.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_switch: DashMap::new(),
        }
    }

    /// The configured cooldown period.
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Time left before `player` may switch again, or `None` if they may
    /// switch now.
    pub fn remaining(&self, player: PlayerId) -> Option<Duration> {
        let last = *self.last_switch.get(&player)?;
        let elapsed = Instant::now().saturating_duration_since(last);
        let remaining = self.period.saturating_sub(elapsed);
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Start the cooldown for `player` now.
    pub fn record(&self, player: PlayerId) {
        self.last_switch.insert(player, Instant::now());
    }

    /// Forget the cooldown for `player`.
    pub fn clear(&self, player: PlayerId) {
        self.last_switch.remove(&player);
    }
}
