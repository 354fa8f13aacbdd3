//! fusion.rs — Batch fusion entry point
//!
//! One call per sealed coincidence batch: observations → center rays →
//! least-squares point → configured error radius → feasible region.
//! Fusion is pure and CPU-bound; every failure mode downgrades to a
//! flag on the outcome rather than aborting the batch.

use wither_types::{EstimateFlag, FusionError, Observation, Polygon, Vec2};

use crate::estimate::ErrorEstimator;
use crate::intersect::intersect_rays;
use crate::ray::{observation_to_ray, observation_to_wedge, RayChoice, Wedge};
use crate::region::{feasible_region, pairwise_regions};

/// How the uncertainty region is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    /// Intersection of every observer's wedge (convex, all must agree).
    Intersection,
    /// Union of all pairwise wedge intersections ("≥ 2 agree"),
    /// robust to a single outlier observer.
    PairwiseUnion,
}

/// Result of fusing one batch. The orchestrator lifts this into an
/// `EventEstimate`; the harness compares it against ground truth.
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub point: Vec2,
    pub error_radius: f64,
    pub flags: Vec<EstimateFlag>,
    /// All-agree convex region; `None` when empty.
    pub region: Option<Polygon>,
    /// Pairwise cells; populated only in `PairwiseUnion` mode.
    pub pairwise_cells: Vec<Polygon>,
    /// The observations that actually contributed (degenerate ones are
    /// dropped with a warning, not fatal).
    pub used: Vec<Observation>,
}

/// Fuse a sealed batch.
///
/// Degenerate observations (observer inside its own hint square —
/// malformed input, since a real hint is at least a view distance away)
/// are dropped individually; the batch fails only if fewer than two
/// usable observations remain.
pub fn fuse_batch(
    observations: &[Observation],
    estimator: &dyn ErrorEstimator,
    mode: RegionMode,
) -> Result<FusionOutcome, FusionError> {
    if observations.len() < 2 {
        return Err(FusionError::InsufficientObservations {
            got: observations.len(),
        });
    }

    let mut used: Vec<Observation> = Vec::with_capacity(observations.len());
    let mut rays = Vec::with_capacity(observations.len());
    let mut wedges: Vec<Wedge> = Vec::with_capacity(observations.len());
    for obs in observations {
        match (
            observation_to_ray(obs, RayChoice::Center),
            observation_to_wedge(obs),
        ) {
            (Ok(ray), Ok(wedge)) => {
                rays.push(ray);
                wedges.push(wedge);
                used.push(obs.clone());
            }
            _ => {
                tracing::warn!(
                    observer_id = %obs.observer_id,
                    hint_x = obs.hint.0,
                    hint_z = obs.hint.1,
                    "dropping degenerate observation"
                );
            }
        }
    }
    if used.len() < 2 {
        return Err(FusionError::InsufficientObservations { got: used.len() });
    }

    let mut flags = Vec::new();
    let solution = intersect_rays(&rays)?;

    let error_radius = if solution.ill_conditioned {
        flags.push(EstimateFlag::IllConditioned);
        f64::INFINITY
    } else {
        estimator.radius(&used, solution.point)?
    };

    let all_agree = feasible_region(&wedges);
    let region = if all_agree.is_empty() {
        flags.push(EstimateFlag::EmptyFeasibleRegion);
        None
    } else {
        Some(all_agree)
    };

    let pairwise_cells = match mode {
        RegionMode::Intersection => Vec::new(),
        RegionMode::PairwiseUnion => pairwise_regions(&wedges),
    };

    Ok(FusionOutcome {
        point: solution.point,
        error_radius,
        flags,
        region,
        pairwise_cells,
        used,
    })
}
