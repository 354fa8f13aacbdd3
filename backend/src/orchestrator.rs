//! orchestrator.rs — The pipeline's single consumer loop
//!
//! Sessions produce into one merged channel; this loop feeds the gate,
//! fuses sealed batches under a deadline, and fans the estimate out to
//! the sinks. Fusion runs on the blocking pool so a pathological
//! corner-enumeration can never stall hint intake; when it overruns the
//! deadline the linear radius is substituted and the estimate flagged.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use wither_geom::estimate::{ErrorEstimator, EstimatorKind};
use wither_geom::fusion::{fuse_batch, FusionOutcome, RegionMode};
use wither_types::{EstimateFlag, EventEstimate, Observation};

use crate::config::Config;
use crate::gate::{CoincidenceGate, SealedBatch};
use crate::observer::SessionEvent;
use crate::status::StatusHandle;

/// Gate timeout sweep cadence. Fine enough that a batch seals within a
/// quarter second of its window elapsing.
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct Orchestrator {
    gate: CoincidenceGate,
    estimator: Arc<dyn ErrorEstimator>,
    region_mode: RegionMode,
    deadline: Duration,
    sigma: f64,
    /// A hint can never be farther from its observer than the server's
    /// view distance; anything past this is a malformed source.
    max_hint_distance: f64,
    log_tx: mpsc::UnboundedSender<EventEstimate>,
    chat_tx: Option<mpsc::UnboundedSender<EventEstimate>>,
    status: StatusHandle,
    diagnostics_dir: Option<String>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        log_tx: mpsc::UnboundedSender<EventEstimate>,
        chat_tx: Option<mpsc::UnboundedSender<EventEstimate>>,
        status: StatusHandle,
    ) -> Self {
        let estimator: Arc<dyn ErrorEstimator> =
            Arc::from(config.locator.estimator.build(config.locator.sigma));
        Self {
            gate: CoincidenceGate::new(config.locator.batch_window_ms),
            estimator,
            region_mode: config.locator.region_mode,
            deadline: Duration::from_millis(config.locator.estimator_deadline_ms),
            sigma: config.locator.sigma,
            max_hint_distance: config.locator.view_distance_blocks as f64 + 2.0,
            log_tx,
            chat_tx,
            status,
            diagnostics_dir: config
                .diagnostics
                .enabled
                .then(|| config.diagnostics.out_dir.clone()),
        }
    }

    /// Run until the session channel closes or shutdown is signaled.
    /// On shutdown the pending batch is flushed iff it has a quorum.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(SessionEvent::Up(id)) => {
                            self.gate.session_up(&id);
                            self.status.set_session(&id, true).await;
                        }
                        Some(SessionEvent::Down(id)) => {
                            self.gate.session_down(&id);
                            self.status.set_session(&id, false).await;
                            warn!(observer = %id, "observer disconnected");
                        }
                        Some(SessionEvent::Hint(obs)) => {
                            let hint_dist = obs.hint_center().dist(obs.observer_pos);
                            if hint_dist > self.max_hint_distance {
                                warn!(
                                    observer = %obs.observer_id,
                                    hint_dist,
                                    "hint beyond the view horizon, discarding"
                                );
                            } else if let Some(batch) = self.gate.offer(obs, now_ms()) {
                                self.process_batch(batch).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    if let Some(batch) = self.gate.sweep(now_ms()) {
                        self.process_batch(batch).await;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Some(batch) = self.gate.flush() {
            info!("flushing pending batch at shutdown");
            self.process_batch(batch).await;
        }
    }

    async fn process_batch(&mut self, batch: SealedBatch) {
        let n = batch.observations.len();
        let (outcome, degraded) = match self.fuse_with_deadline(&batch.observations).await {
            Ok(result) => result,
            Err(e) => {
                warn!(n, error = %e, "batch discarded");
                self.status.record_dropped().await;
                return;
            }
        };

        let mut flags = outcome.flags.clone();
        if degraded {
            flags.push(EstimateFlag::EstimatorDegraded);
        }

        let mean_hint_y = outcome
            .used
            .iter()
            .map(|o| o.hint_y as f64)
            .sum::<f64>()
            / outcome.used.len().max(1) as f64;

        let estimate = EventEstimate {
            x: outcome.point.x,
            z: outcome.point.z,
            y: mean_hint_y,
            error_radius: outcome.error_radius,
            feasible_region: outcome.region.clone(),
            flags,
            observations: outcome.used.clone(),
            sealed_at_ms: batch.first_at_ms,
        };

        info!(
            x = estimate.x,
            z = estimate.z,
            radius = estimate.error_radius,
            observers = n,
            flags = ?estimate.flags,
            "event located"
        );

        self.status.record_fused(&estimate, degraded).await;
        if self.log_tx.send(estimate.clone()).is_err() {
            warn!("log sink queue closed");
        }
        if let Some(chat_tx) = &self.chat_tx {
            if chat_tx.send(estimate.clone()).is_err() {
                warn!("chat sink queue closed");
            }
        }
        if let Some(dir) = &self.diagnostics_dir {
            self.write_diagnostic(dir.clone(), estimate);
        }
    }

    /// Fuse on the blocking pool under the configured deadline; fall
    /// back to the linear estimator when the configured one overruns.
    async fn fuse_with_deadline(
        &self,
        observations: &[Observation],
    ) -> Result<(FusionOutcome, bool), wither_types::FusionError> {
        let estimator = Arc::clone(&self.estimator);
        let obs = observations.to_vec();
        let mode = self.region_mode;
        let primary = tokio::time::timeout(
            self.deadline,
            tokio::task::spawn_blocking(move || fuse_batch(&obs, estimator.as_ref(), mode)),
        )
        .await;

        match primary {
            Ok(Ok(result)) => result.map(|outcome| (outcome, false)),
            Ok(Err(join_err)) => {
                // A panic in pure math would be a bug; degrade rather
                // than lose the batch.
                warn!(error = %join_err, "fusion task failed, degrading to linear");
                self.fuse_linear(observations).map(|o| (o, true))
            }
            Err(_) => {
                warn!(
                    estimator = self.estimator.name(),
                    deadline_ms = self.deadline.as_millis() as u64,
                    "estimator overran its deadline, substituting linear radius"
                );
                self.fuse_linear(observations).map(|o| (o, true))
            }
        }
    }

    fn fuse_linear(
        &self,
        observations: &[Observation],
    ) -> Result<FusionOutcome, wither_types::FusionError> {
        let linear = EstimatorKind::Linear.build(self.sigma);
        fuse_batch(observations, linear.as_ref(), self.region_mode)
    }

    fn write_diagnostic(&self, dir: String, estimate: EventEstimate) {
        tokio::task::spawn_blocking(move || {
            let scene = wither_geom::plot::DiagnosticScene {
                observations: &estimate.observations,
                estimate: wither_types::Vec2::new(estimate.x, estimate.z),
                error_radius: estimate.error_radius,
                region: estimate.feasible_region.as_ref(),
                truth: None,
            };
            let path = std::path::Path::new(&dir)
                .join(format!("batch_{}.png", estimate.sealed_at_ms));
            if let Err(e) = wither_geom::plot::save_png(&scene, 1024, &path) {
                warn!(error = %e, "diagnostic render failed");
            }
        });
    }
}
