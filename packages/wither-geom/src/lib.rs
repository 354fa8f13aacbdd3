//! # wither-geom
//!
//! Geometric-inference core of the Wither Locator suite.
//!
//! A wither-spawn broadcast leaks one integer coordinate hint per nearby
//! observer: the event's bearing, clamped to the observer's view-distance
//! horizon. This crate turns those hints back into a position:
//!
//! 1. `hint` — the server-faithful forward model (for synthesis/backfill)
//! 2. `ray` — hint → ray and angular uncertainty wedge
//! 3. `intersect` — least-squares closest point to n rays
//! 4. `estimate` — four interchangeable error-radius strategies
//! 5. `region` — wedge intersection into a convex feasible polygon
//! 6. `fusion` — the one-call-per-batch entry point
//! 7. `pattern` / `plot` — synthetic layouts and raster diagnostics
//!
//! Everything here is pure and CPU-bound; the async pipeline lives in
//! the backend crate.

pub mod estimate;
pub mod fusion;
pub mod hint;
pub mod intersect;
pub mod pattern;
pub mod plot;
pub mod ray;
pub mod region;

pub use estimate::{ErrorEstimator, EstimatorKind};
pub use fusion::{fuse_batch, FusionOutcome, RegionMode};
pub use hint::project_hint;
pub use intersect::{intersect_rays, IntersectionSolution};
pub use pattern::{observer_positions, synthesize_batch, Pattern};
pub use ray::{observation_to_ray, observation_to_wedge, HalfPlane, Ray, RayChoice, Wedge};
pub use region::{feasible_region, pairwise_regions};
