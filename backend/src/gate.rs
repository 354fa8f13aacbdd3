//! gate.rs — Coincidence gate
//!
//! The server broadcasts one spawn event to every nearby observer at
//! essentially the same instant; any spread between their reports is
//! per-observer network jitter. The gate buffers incoming hints and
//! releases them as one batch when every connected observer has
//! reported, or when the batch window elapses with at least two.
//!
//! Pure state machine: no clocks, no I/O. The orchestrator feeds it
//! wall-clock milliseconds from its own loop, which also makes the
//! timeline fully scriptable in tests.

use std::collections::HashSet;

use tracing::{debug, info};
use wither_types::Observation;

/// A batch released by the gate, ready for fusion. Owned by the
/// orchestrator from here on.
#[derive(Debug, Clone)]
pub struct SealedBatch {
    /// Timestamp of the batch's first hint; batches emit in this order.
    pub first_at_ms: u64,
    pub observations: Vec<Observation>,
}

#[derive(Debug)]
struct PendingBatch {
    first_at_ms: u64,
    contributors: HashSet<String>,
    observations: Vec<Observation>,
}

impl PendingBatch {
    fn open(obs: Observation, now_ms: u64) -> Self {
        let mut contributors = HashSet::new();
        contributors.insert(obs.observer_id.clone());
        Self {
            first_at_ms: now_ms,
            contributors,
            observations: vec![obs],
        }
    }

    fn seal(self) -> SealedBatch {
        SealedBatch {
            first_at_ms: self.first_at_ms,
            observations: self.observations,
        }
    }
}

#[derive(Debug)]
pub struct CoincidenceGate {
    window_ms: u64,
    /// Observer IDs with a live session; the early-seal condition
    /// compares contributors against this set.
    active: HashSet<String>,
    pending: Option<PendingBatch>,
}

impl CoincidenceGate {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            active: HashSet::new(),
            pending: None,
        }
    }

    pub fn session_up(&mut self, observer_id: &str) {
        self.active.insert(observer_id.to_string());
    }

    /// A dropped session only shrinks the early-seal quorum; a pending
    /// batch keeps aggregating until its window elapses.
    pub fn session_down(&mut self, observer_id: &str) {
        self.active.remove(observer_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Feed one hint. May release a batch: either the pending one sealed
    /// early (all active observers reported) or a stale one displaced by
    /// a duplicate contributor.
    pub fn offer(&mut self, obs: Observation, now_ms: u64) -> Option<SealedBatch> {
        // A pending batch past its window is resolved before the new
        // hint is considered, so a long-idle gate never glues two
        // distinct events together.
        let mut released = self.expire_pending(now_ms);

        match self.pending.take() {
            None => {
                self.pending = Some(PendingBatch::open(obs, now_ms));
            }
            Some(mut pending) => {
                if pending.contributors.contains(&obs.observer_id) {
                    // Same observer twice means a second event: the
                    // server sends each observer one hint per spawn.
                    debug!(
                        observer_id = %obs.observer_id,
                        "duplicate contributor, rotating batch"
                    );
                    if pending.contributors.len() >= 2 {
                        released = Some(pending.seal());
                    } else {
                        info!("dropping single-contributor batch displaced by new event");
                    }
                    self.pending = Some(PendingBatch::open(obs, now_ms));
                } else {
                    pending.contributors.insert(obs.observer_id.clone());
                    pending.observations.push(obs);
                    let quorum = self.active.len();
                    if quorum >= 2 && pending.contributors.len() >= quorum {
                        released = Some(pending.seal());
                    } else {
                        self.pending = Some(pending);
                    }
                }
            }
        }
        released
    }

    /// Periodic timeout sweep.
    pub fn sweep(&mut self, now_ms: u64) -> Option<SealedBatch> {
        self.expire_pending(now_ms)
    }

    /// Shutdown: release the pending batch if it already has a quorum,
    /// drop it otherwise.
    pub fn flush(&mut self) -> Option<SealedBatch> {
        let pending = self.pending.take()?;
        if pending.contributors.len() >= 2 {
            Some(pending.seal())
        } else {
            info!("dropping single-contributor batch at shutdown");
            None
        }
    }

    fn expire_pending(&mut self, now_ms: u64) -> Option<SealedBatch> {
        let expired = match &self.pending {
            Some(p) => now_ms.saturating_sub(p.first_at_ms) >= self.window_ms,
            None => false,
        };
        if !expired {
            return None;
        }
        let pending = self.pending.take()?;
        if pending.contributors.len() >= 2 {
            Some(pending.seal())
        } else {
            info!(
                first_at_ms = pending.first_at_ms,
                "dropping timed-out batch with a single contributor"
            );
            None
        }
    }
}
