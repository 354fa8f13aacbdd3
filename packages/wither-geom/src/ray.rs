//! ray.rs — Observation → ray and angular wedge
//!
//! A hint constrains the event to the ray from the observer through the
//! hint's unit square. The square subtends a small angle at the observer;
//! that angular interval (the wedge) is the observation's entire
//! information content, and everything downstream — intersection, error
//! bounds, feasible region — is built from it.

use serde::{Deserialize, Serialize};
use wither_types::{FusionError, Observation, Vec2};

use crate::hint::observer_inside_hint;

/// Which representative of the hint's unit square a ray goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayChoice {
    /// The square's center (rx+0.5, rz+0.5) — the nominal choice.
    Center,
    /// Corner `k ∈ 0..4`: (rx + (k&1), rz + ((k>>1)&1)).
    Corner(u8),
}

/// Point-and-unit-direction ray in the block plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec2,
    pub direction: Vec2,
}

/// Angular uncertainty wedge at one observer: every bearing from `apex`
/// that meets the hint's unit square.
///
/// Invariant: `theta_min <= theta_max` and `theta_max - theta_min < π`.
/// When the raw corner bearings straddle the ±π discontinuity they are
/// unwrapped before min/max, so `theta_max` may exceed π.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Wedge {
    pub apex: Vec2,
    pub theta_min: f64,
    pub theta_max: f64,
}

/// Closed half-plane `a·x + b·z ≤ c`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HalfPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl HalfPlane {
    /// Signed violation of the constraint at `p` (negative = inside).
    pub fn signed_distance(&self, p: Vec2) -> f64 {
        self.a * p.x + self.b * p.z - self.c
    }

    /// Inside test with the clipper's relative tolerance.
    pub fn contains(&self, p: Vec2) -> bool {
        self.signed_distance(p) <= 1e-9 * (1.0 + p.x.abs() + p.z.abs())
    }
}

/// Build the ray for one observation and a square representative.
pub fn observation_to_ray(obs: &Observation, choice: RayChoice) -> Result<Ray, FusionError> {
    let q = match choice {
        RayChoice::Center => obs.hint_center(),
        RayChoice::Corner(k) => obs.hint_corner(k & 0b11),
    };
    let direction = q
        .sub(obs.observer_pos)
        .normalized()
        .ok_or_else(|| FusionError::DegenerateObservation {
            observer_id: obs.observer_id.clone(),
        })?;
    Ok(Ray {
        origin: obs.observer_pos,
        direction,
    })
}

/// Build the angular wedge for one observation.
///
/// The four corner bearings come from `atan2`; when they straddle ±π
/// (observer due east of the square, looking west) the negative ones are
/// lifted by 2π so the interval is contiguous. Treating the straddle as
/// an error — or silently min/maxing the raw values — mislocates every
/// westward event.
pub fn observation_to_wedge(obs: &Observation) -> Result<Wedge, FusionError> {
    if observer_inside_hint(obs.observer_pos, obs.hint) {
        return Err(FusionError::DegenerateObservation {
            observer_id: obs.observer_id.clone(),
        });
    }

    let mut angles = [0.0f64; 4];
    for (k, slot) in angles.iter_mut().enumerate() {
        let corner = obs.hint_corner(k as u8);
        let d = corner.sub(obs.observer_pos);
        *slot = d.z.atan2(d.x);
    }

    let raw_min = angles.iter().cloned().fold(f64::INFINITY, f64::min);
    let raw_max = angles.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if raw_max - raw_min > std::f64::consts::PI {
        // Straddles ±π: unwrap by lifting the negative bearings. This is
        // normal westward geometry, not an error.
        tracing::debug!(observer_id = %obs.observer_id, "wedge straddles ±π, unwrapping");
        for a in angles.iter_mut() {
            if *a < 0.0 {
                *a += 2.0 * std::f64::consts::PI;
            }
        }
    }

    let theta_min = angles.iter().cloned().fold(f64::INFINITY, f64::min);
    let theta_max = angles.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if theta_max - theta_min >= std::f64::consts::PI {
        // Span this wide means the square surrounds the observer.
        return Err(FusionError::DegenerateObservation {
            observer_id: obs.observer_id.clone(),
        });
    }

    Ok(Wedge {
        apex: obs.observer_pos,
        theta_min,
        theta_max,
    })
}

impl Wedge {
    pub fn theta_mid(&self) -> f64 {
        0.5 * (self.theta_min + self.theta_max)
    }

    /// The two bounding half-planes, oriented so a far point along the
    /// middle bearing satisfies both.
    pub fn half_planes(&self) -> [HalfPlane; 2] {
        // Probe distance for orientation; only the sign matters.
        const R: f64 = 1e6;
        let mid = self.theta_mid();
        let probe = Vec2::new(
            self.apex.x + R * mid.cos(),
            self.apex.z + R * mid.sin(),
        );
        let mut planes = [
            Self::boundary_line(self.apex, self.theta_min),
            Self::boundary_line(self.apex, self.theta_max),
        ];
        for hp in planes.iter_mut() {
            if hp.signed_distance(probe) > 0.0 {
                hp.a = -hp.a;
                hp.b = -hp.b;
                hp.c = -hp.c;
            }
        }
        planes
    }

    fn boundary_line(apex: Vec2, theta: f64) -> HalfPlane {
        let a = -theta.sin();
        let b = theta.cos();
        HalfPlane {
            a,
            b,
            c: a * apex.x + b * apex.z,
        }
    }

    /// Whether `p` lies within the angular interval as seen from the
    /// apex (small tolerance on both bounds).
    pub fn contains_point(&self, p: Vec2) -> bool {
        let d = p.sub(self.apex);
        if d.norm() < 1e-12 {
            return false;
        }
        let mut theta = d.z.atan2(d.x);
        // The wedge interval may live in (−π, 2π) after unwrapping.
        if theta < self.theta_min {
            theta += 2.0 * std::f64::consts::PI;
        }
        const TOL: f64 = 1e-9;
        theta >= self.theta_min - TOL && theta <= self.theta_max + TOL
    }
}
