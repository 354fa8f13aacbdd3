//! event_gen.rs — Synthetic spawn events and their hint envelopes
//!
//! Samples events on an annulus around the origin, lays out the
//! observer fleet, and produces the exact `HintEnvelope` records a real
//! observer source would emit, including per-observer delivery delay.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use wither_geom::hint::project_hint;
use wither_geom::pattern::{observer_positions, Pattern};
use wither_types::{HintEnvelope, Vec2};

use crate::scenarios::{ScenarioConfig, ScenarioType};

pub struct EventSampler {
    rng: StdRng,
    r_min: f64,
    r_max: f64,
}

impl EventSampler {
    pub fn new(seed: u64, r_min: f64, r_max: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            r_min,
            r_max,
        }
    }

    /// Uniform bearing, uniform radius over the annulus.
    pub fn sample(&mut self) -> Vec2 {
        let r = self.rng.gen_range(self.r_min..self.r_max);
        let theta = self.rng.gen_range(0.0..std::f64::consts::TAU);
        Vec2::new(r * theta.cos(), r * theta.sin())
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Fleet layout for a scenario: the colinear preset overrides the
/// configured pattern with a single line of observers.
pub fn fleet_positions(
    pattern: Pattern,
    n: usize,
    extent: f64,
    scenario: &ScenarioConfig,
) -> Vec<Vec2> {
    if scenario.has(ScenarioType::ColinearFleet) {
        let half = extent / 2.0;
        return (0..n)
            .map(|i| {
                let t = if n <= 1 {
                    0.0
                } else {
                    -half + extent * i as f64 / (n - 1) as f64
                };
                Vec2::new(t, 0.0)
            })
            .collect();
    }
    observer_positions(pattern, n, extent)
}

/// One observer's planned emission for one event.
#[derive(Debug, Clone)]
pub struct PlannedEmission {
    pub observer_idx: usize,
    pub delay_ms: u64,
    pub envelope: HintEnvelope,
}

/// Build the fleet's emissions for one event: hints via the
/// server-faithful projection, Gaussian delivery delay per observer,
/// scenario faults applied (dropouts skipped, poisoned hint swapped).
pub fn plan_event(
    event: Vec2,
    positions: &[Vec2],
    view_distance: f64,
    t_ms: u64,
    scenario: &ScenarioConfig,
    rng: &mut StdRng,
) -> Vec<PlannedEmission> {
    let jitter = Normal::new(0.0, scenario.jitter_sigma_ms()).unwrap();

    let mut out = Vec::with_capacity(positions.len());
    for (idx, &pos) in positions.iter().enumerate() {
        if scenario.is_dropped(idx) {
            continue;
        }
        let target = if scenario.is_poisoned(idx) {
            // A fabricated event on the opposite bearing.
            pos.sub(event.sub(pos))
        } else {
            event
        };
        let hint = project_hint(target, pos, view_distance);
        let delay_ms = jitter.sample(rng).abs() as u64;
        out.push(PlannedEmission {
            observer_idx: idx,
            delay_ms,
            envelope: HintEnvelope {
                observer_id: format!("obs-{idx}"),
                observer_pos: [pos.x, 64.0, pos.z],
                hint: [hint.0, 64, hint.1],
                t_ms: t_ms + delay_ms,
            },
        });
    }
    out
}
