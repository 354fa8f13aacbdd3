//! estimate.rs — Error-radius estimators
//!
//! Four interchangeable strategies for bounding how far the fused point
//! can sit from the truth, given that each hint only pins the event's
//! bearing to within its unit square:
//!
//! - `exhaustive`: all 4ⁿ corner assignments, authoritative, n ≤ 6 use
//! - `optimized_corner`: 2ⁿ over the two bearing-extreme corners
//! - `linear`: finite-difference Jacobian, O(n), the live default
//! - `covariance`: σ-based statistical radius, O(n)
//!
//! Selection happens once at construction; the orchestrator only ever
//! sees the trait.

use serde::{Deserialize, Serialize};
use wither_types::{FusionError, Observation, Vec2};

use crate::intersect::{intersect_rays, normal_matrix};
use crate::ray::{observation_to_ray, Ray, RayChoice};

/// One error-bounding strategy. `radius` may legitimately return
/// `f64::INFINITY` when the bundle geometry collapses.
pub trait ErrorEstimator: Send + Sync {
    fn name(&self) -> &'static str;
    fn radius(&self, observations: &[Observation], nominal: Vec2) -> Result<f64, FusionError>;
}

/// Configuration-time estimator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    Exhaustive,
    OptimizedCorner,
    Linear,
    Covariance,
}

impl EstimatorKind {
    /// `sigma` is only read by the covariance strategy (blocks of
    /// measurement noise orthogonal to the ray).
    pub fn build(self, sigma: f64) -> Box<dyn ErrorEstimator> {
        match self {
            EstimatorKind::Exhaustive => Box::new(ExhaustiveCorner),
            EstimatorKind::OptimizedCorner => Box::new(OptimizedCorner),
            EstimatorKind::Linear => Box::new(LinearPropagation),
            EstimatorKind::Covariance => Box::new(CovariancePropagation { sigma }),
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EstimatorKind::Exhaustive => "exhaustive",
            EstimatorKind::OptimizedCorner => "optimized_corner",
            EstimatorKind::Linear => "linear",
            EstimatorKind::Covariance => "covariance",
        };
        f.write_str(s)
    }
}

// ── Exhaustive corner enumeration ────────────────────────────────────────────

/// Every corner assignment over the n observations: O(4ⁿ) solves.
pub struct ExhaustiveCorner;

impl ErrorEstimator for ExhaustiveCorner {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn radius(&self, observations: &[Observation], nominal: Vec2) -> Result<f64, FusionError> {
        let n = observations.len();
        if n < 2 {
            return Err(FusionError::InsufficientObservations { got: n });
        }
        if n > 12 {
            // 4ⁿ is out of reach long before the u64 counter overflows;
            // hand the batch to the 2ⁿ enumeration instead.
            tracing::warn!(n, "exhaustive estimator infeasible at this size, using optimized corners");
            return OptimizedCorner.radius(observations, nominal);
        }
        if n > 6 {
            tracing::warn!(n, "exhaustive estimator past its intended size; consider optimized_corner");
        }

        let mut worst: f64 = 0.0;
        let combos = 4u64.pow(n as u32);
        let mut rays: Vec<Ray> = Vec::with_capacity(n);
        for combo in 0..combos {
            rays.clear();
            let mut digits = combo;
            for obs in observations {
                let corner = (digits & 0b11) as u8;
                digits >>= 2;
                rays.push(observation_to_ray(obs, RayChoice::Corner(corner))?);
            }
            let sol = intersect_rays(&rays)?;
            let d = if sol.ill_conditioned {
                f64::INFINITY
            } else {
                sol.point.dist(nominal)
            };
            worst = worst.max(d);
        }
        Ok(worst)
    }
}

// ── Optimized corner enumeration ─────────────────────────────────────────────

/// Only the two corners that realize each observation's extreme bearings
/// can widen the wedge; the other two are interior. O(2ⁿ) solves.
pub struct OptimizedCorner;

/// Indices of the corners attaining θ_min and θ_max as seen from the
/// observer, with the same ±π unwrap the wedge builder applies.
fn extreme_corners(obs: &Observation) -> (u8, u8) {
    let mut angles = [0.0f64; 4];
    for (k, slot) in angles.iter_mut().enumerate() {
        let d = obs.hint_corner(k as u8).sub(obs.observer_pos);
        *slot = d.z.atan2(d.x);
    }
    let raw_min = angles.iter().cloned().fold(f64::INFINITY, f64::min);
    let raw_max = angles.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if raw_max - raw_min > std::f64::consts::PI {
        for a in angles.iter_mut() {
            if *a < 0.0 {
                *a += 2.0 * std::f64::consts::PI;
            }
        }
    }
    let mut kmin = 0u8;
    let mut kmax = 0u8;
    for k in 1..4u8 {
        if angles[k as usize] < angles[kmin as usize] {
            kmin = k;
        }
        if angles[k as usize] > angles[kmax as usize] {
            kmax = k;
        }
    }
    (kmin, kmax)
}

impl ErrorEstimator for OptimizedCorner {
    fn name(&self) -> &'static str {
        "optimized_corner"
    }

    fn radius(&self, observations: &[Observation], nominal: Vec2) -> Result<f64, FusionError> {
        let n = observations.len();
        if n < 2 {
            return Err(FusionError::InsufficientObservations { got: n });
        }

        let extremes: Vec<(u8, u8)> = observations.iter().map(extreme_corners).collect();

        let mut worst: f64 = 0.0;
        let mut rays: Vec<Ray> = Vec::with_capacity(n);
        for mask in 0u64..(1u64 << n) {
            rays.clear();
            for (i, obs) in observations.iter().enumerate() {
                let (kmin, kmax) = extremes[i];
                let corner = if mask >> i & 1 == 1 { kmax } else { kmin };
                rays.push(observation_to_ray(obs, RayChoice::Corner(corner))?);
            }
            let sol = intersect_rays(&rays)?;
            let d = if sol.ill_conditioned {
                f64::INFINITY
            } else {
                sol.point.dist(nominal)
            };
            worst = worst.max(d);
        }
        Ok(worst)
    }
}

// ── Linear propagation ───────────────────────────────────────────────────────

/// Finite-difference Jacobian of the estimate against each hint
/// coordinate; each coordinate's worst contribution is half a block
/// (the square's half-width). First-order, O(n), the live default.
pub struct LinearPropagation;

const FD_DELTA: f64 = 1e-3;

impl LinearPropagation {
    fn solve_with_offset(
        observations: &[Observation],
        perturbed: usize,
        offset: Vec2,
    ) -> Result<Vec2, FusionError> {
        let mut rays = Vec::with_capacity(observations.len());
        for (i, obs) in observations.iter().enumerate() {
            let q = if i == perturbed {
                obs.hint_center().add(offset)
            } else {
                obs.hint_center()
            };
            let direction = q.sub(obs.observer_pos).normalized().ok_or_else(|| {
                FusionError::DegenerateObservation {
                    observer_id: obs.observer_id.clone(),
                }
            })?;
            rays.push(Ray {
                origin: obs.observer_pos,
                direction,
            });
        }
        Ok(intersect_rays(&rays)?.point)
    }
}

impl ErrorEstimator for LinearPropagation {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn radius(&self, observations: &[Observation], nominal: Vec2) -> Result<f64, FusionError> {
        let n = observations.len();
        if n < 2 {
            return Err(FusionError::InsufficientObservations { got: n });
        }

        let mut acc = Vec2::default();
        for i in 0..n {
            let ex = Self::solve_with_offset(observations, i, Vec2::new(FD_DELTA, 0.0))?;
            let ez = Self::solve_with_offset(observations, i, Vec2::new(0.0, FD_DELTA))?;
            let jx = ex.sub(nominal).scale(1.0 / FD_DELTA);
            let jz = ez.sub(nominal).scale(1.0 / FD_DELTA);
            acc.x += (jx.x.abs() + jz.x.abs()) * 0.5;
            acc.z += (jx.z.abs() + jz.z.abs()) * 0.5;
        }
        Ok(acc.norm())
    }
}

// ── Covariance propagation ───────────────────────────────────────────────────

/// Statistical (1-sigma) radius assuming per-ray orthogonal noise of
/// variance σ²: Cov(E) ≈ σ² · A⁻¹, radius = √λ_max(Cov) = σ / √λ_min(A).
pub struct CovariancePropagation {
    pub sigma: f64,
}

impl ErrorEstimator for CovariancePropagation {
    fn name(&self) -> &'static str {
        "covariance"
    }

    fn radius(&self, observations: &[Observation], _nominal: Vec2) -> Result<f64, FusionError> {
        let n = observations.len();
        if n < 2 {
            return Err(FusionError::InsufficientObservations { got: n });
        }

        let mut rays = Vec::with_capacity(n);
        for obs in observations {
            rays.push(observation_to_ray(obs, RayChoice::Center)?);
        }
        let m = normal_matrix(&rays);
        let half_trace = 0.5 * m.trace();
        let disc = (half_trace * half_trace - m.det()).max(0.0).sqrt();
        let lambda_min = half_trace - disc;
        if lambda_min <= 1e-12 {
            return Ok(f64::INFINITY);
        }
        Ok(self.sigma / lambda_min.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::project_hint;

    fn synth_obs(id: &str, pos: Vec2, event: Vec2, view: f64) -> Observation {
        let hint = project_hint(event, pos, view);
        Observation {
            observer_id: id.into(),
            observer_pos: pos,
            observer_y: 64.0,
            hint,
            hint_y: 64,
            observed_at_ms: 0,
        }
    }

    fn square_layout(event: Vec2) -> Vec<Observation> {
        [
            Vec2::new(80_000.0, 80_000.0),
            Vec2::new(-80_000.0, 80_000.0),
            Vec2::new(80_000.0, -80_000.0),
            Vec2::new(-80_000.0, -80_000.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, &p)| synth_obs(&format!("obs-{i}"), p, event, 160.0))
        .collect()
    }

    fn nominal_of(observations: &[Observation]) -> Vec2 {
        let rays: Vec<Ray> = observations
            .iter()
            .map(|o| observation_to_ray(o, RayChoice::Center).unwrap())
            .collect();
        intersect_rays(&rays).unwrap().point
    }

    #[test]
    fn corner_estimators_agree_on_square_layout() {
        let event = Vec2::new(250_000.0, -150_000.0);
        let obs = square_layout(event);
        let nominal = nominal_of(&obs);

        let exhaustive = ExhaustiveCorner.radius(&obs, nominal).unwrap();
        let optimized = OptimizedCorner.radius(&obs, nominal).unwrap();

        assert!(exhaustive.is_finite() && exhaustive > 0.0);
        // The optimized set is a subset of the exhaustive set, and the
        // exhaustive worst case is attained at bearing-extreme corners.
        assert!(optimized <= exhaustive + 1e-6);
        assert!(optimized >= exhaustive * 0.5);
    }

    #[test]
    fn linear_tracks_exhaustive_within_spec_bound() {
        let event = Vec2::new(250_000.0, -150_000.0);
        let obs = square_layout(event);
        let nominal = nominal_of(&obs);

        let exhaustive = ExhaustiveCorner.radius(&obs, nominal).unwrap();
        let linear = LinearPropagation.radius(&obs, nominal).unwrap();
        assert!(linear <= exhaustive * 1.5 + 0.5, "linear={linear} exhaustive={exhaustive}");
    }

    #[test]
    fn covariance_scales_with_sigma() {
        let event = Vec2::new(40_000.0, 90_000.0);
        let obs = square_layout(event);
        let nominal = nominal_of(&obs);

        let r1 = CovariancePropagation { sigma: 0.5 }.radius(&obs, nominal).unwrap();
        let r2 = CovariancePropagation { sigma: 1.0 }.radius(&obs, nominal).unwrap();
        assert!(r1.is_finite());
        assert!((r2 / r1 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn monotone_information_for_corner_estimators() {
        let event = Vec2::new(120_000.0, 60_000.0);
        let mut obs = square_layout(event);
        let nominal = nominal_of(&obs);

        let with_four = OptimizedCorner.radius(&obs, nominal).unwrap();
        obs.truncate(3);
        let with_three = OptimizedCorner.radius(&obs, nominal).unwrap();
        // Adding the fourth observer must not widen the bound.
        assert!(with_four <= with_three + 1e-6);
    }

    #[test]
    fn kind_roundtrips_through_config_names() {
        for (kind, name) in [
            (EstimatorKind::Exhaustive, "exhaustive"),
            (EstimatorKind::OptimizedCorner, "optimized_corner"),
            (EstimatorKind::Linear, "linear"),
            (EstimatorKind::Covariance, "covariance"),
        ] {
            assert_eq!(kind.to_string(), name);
            assert_eq!(kind.build(1.0).name(), name);
        }
    }
}
