//! The pre-switch completion barrier.
//!
//! Before the active pointer moves, every feature module is handed a
//! [`BarrierTicket`]. A module releases its ticket by calling
//! [`BarrierTicket::complete`], or by dropping it (which is logged as
//! abandoned). The coordinator waits on [`SwitchBarrier::wait`] for all
//! tickets to be released, up to a bounded timeout.
//!
//! Tickets are `Send + 'static`, so a module may move its ticket into a
//! spawned task and release it once its I/O finishes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

/// Result of waiting on a [`SwitchBarrier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Every ticket was released before the deadline.
    Completed,
    /// The deadline passed with tickets still outstanding.
    TimedOut {
        /// Names of the modules that had not released their ticket.
        pending: Vec<String>,
    },
}

#[derive(Debug, Default)]
struct BarrierShared {
    outstanding: AtomicUsize,
    next_ticket: AtomicU64,
    pending: Mutex<BTreeMap<u64, String>>,
    released: Notify,
}

impl BarrierShared {
    fn release(&self, ticket: u64) {
        if self.pending.lock().remove(&ticket).is_some() {
            self.outstanding.fetch_sub(1, Ordering::AcqRel);
            self.released.notify_one();
        }
    }

    fn pending_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pending.lock().values().cloned().collect();
        names.sort();
        names
    }
}

/// A wait-group that the coordinator joins before committing a switch.
#[derive(Debug, Default)]
pub struct SwitchBarrier {
    shared: Arc<BarrierShared>,
}

impl SwitchBarrier {
    /// Create a barrier with no outstanding tickets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for the module called `module`.
    pub fn ticket(&self, module: &str) -> BarrierTicket {
        let id = self.shared.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.shared.pending.lock().insert(id, module.to_owned());
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        BarrierTicket {
            shared: Arc::clone(&self.shared),
            id,
            module: module.to_owned(),
            released: false,
        }
    }

    /// Number of tickets not yet released.
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Wait until every ticket is released or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> BarrierOutcome {
        let all_released = async {
            while self.outstanding() > 0 {
                self.shared.released.notified().await;
            }
        };
        match tokio::time::timeout(timeout, all_released).await {
            Ok(()) => BarrierOutcome::Completed,
            Err(_) => BarrierOutcome::TimedOut {
                pending: self.shared.pending_names(),
            },
        }
    }
}

/// One module's obligation to the barrier.
#[derive(Debug)]
pub struct BarrierTicket {
    shared: Arc<BarrierShared>,
    id: u64,
    module: String,
    released: bool,
}

impl BarrierTicket {
    /// The module this ticket was issued to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Signal that the module has finished its pre-switch work.
    pub fn complete(mut self) {
        self.released = true;
        self.shared.release(self.id);
    }
}

impl Drop for BarrierTicket {
    fn drop(&mut self) {
        if !self.released {
            warn!(module = %self.module, "Pre-switch ticket dropped without completing");
            self.shared.release(self.id);
        }
    }
}
