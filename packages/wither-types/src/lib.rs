//! # wither-types
//!
//! Shared types for the Wither Locator suite.
//!
//! These types are used by:
//! - `wither-geom`: ray/wedge construction and batch fusion
//! - `backend`: observer session intake, coincidence gate, sinks
//! - `wither-simulator`: synthetic observer fleet and offline harness
//!
//! ## Coordinate Conventions
//!
//! - Only the horizontal plane is modeled: `x` = east, `z` = south
//!   (block coordinates as the game server reports them).
//! - `y` (height) is never part of the fusion math; it is carried
//!   through as metadata because the event log schema wants it.
//! - A hint `(rx, rz)` is an integer block coordinate; the true
//!   projected coordinate lies in the half-open unit square
//!   `[rx, rx+1) × [rz, rz+1)`.

use serde::{Deserialize, Serialize};

// ── 2D Vector ─────────────────────────────────────────────────────────────────

/// Horizontal block-plane vector (x = east, z = south), in blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub z: f64,
}

impl Vec2 {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn add(&self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.z + other.z)
    }

    pub fn sub(&self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.z - other.z)
    }

    pub fn scale(&self, s: f64) -> Vec2 {
        Vec2::new(self.x * s, self.z * s)
    }

    pub fn dot(&self, other: Vec2) -> f64 {
        self.x * other.x + self.z * other.z
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn dist(&self, other: Vec2) -> f64 {
        self.sub(other).norm()
    }

    /// Unit vector in the same direction. Returns None for the zero vector.
    pub fn normalized(&self) -> Option<Vec2> {
        let n = self.norm();
        if n < 1e-300 {
            None
        } else {
            Some(self.scale(1.0 / n))
        }
    }
}

// ── Observation ───────────────────────────────────────────────────────────────

/// One observer's report of a single spawn-event hint.
///
/// The server broadcasts the hint to every client within earshot; each
/// synthetic observer forwards it together with its own position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Stable observer account name
    pub observer_id: String,
    /// Observer horizontal position at receive time (blocks)
    pub observer_pos: Vec2,
    /// Observer height, metadata only
    pub observer_y: f64,
    /// Integer hint block coordinate (rx, rz)
    pub hint: (i32, i32),
    /// Hint height, metadata only
    pub hint_y: i32,
    /// Wall-clock receive timestamp (milliseconds)
    pub observed_at_ms: u64,
}

impl Observation {
    /// Center of the hint's unit square — the canonical nominal
    /// representative for ray construction.
    pub fn hint_center(&self) -> Vec2 {
        Vec2::new(self.hint.0 as f64 + 0.5, self.hint.1 as f64 + 0.5)
    }

    /// Corner `k ∈ 0..4` of the hint's unit square.
    pub fn hint_corner(&self, k: u8) -> Vec2 {
        Vec2::new(
            (self.hint.0 + (k & 1) as i32) as f64,
            (self.hint.1 + ((k >> 1) & 1) as i32) as f64,
        )
    }
}

// ── Wire envelope (observer source → backend) ────────────────────────────────

/// One ndjson line from an observer source.
///
/// The source (an external protocol client) has already filtered the
/// packet stream down to the wither-spawn world event; position and
/// hint arrive as full 3D tuples, of which the fusion core uses (x, z).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintEnvelope {
    pub observer_id: String,
    /// Observer position (x, y, z)
    pub observer_pos: [f64; 3],
    /// Hint block coordinate (rx, ry, rz)
    pub hint: [i32; 3],
    /// Source receive timestamp (milliseconds)
    pub t_ms: u64,
}

impl HintEnvelope {
    pub fn into_observation(self) -> Observation {
        Observation {
            observer_id: self.observer_id,
            observer_pos: Vec2::new(self.observer_pos[0], self.observer_pos[2]),
            observer_y: self.observer_pos[1],
            hint: (self.hint[0], self.hint[2]),
            hint_y: self.hint[1],
            observed_at_ms: self.t_ms,
        }
    }
}

// ── Polygon ───────────────────────────────────────────────────────────────────

/// Simple polygon, counter-clockwise vertex order.
/// The feasible-region clipper only ever produces convex ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<Vec2>,
}

impl Polygon {
    pub fn is_empty(&self) -> bool {
        self.vertices.len() < 3
    }

    /// Twice the signed area; positive for counter-clockwise order.
    pub fn signed_area2(&self) -> f64 {
        let n = self.vertices.len();
        let mut acc = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            acc += a.x * b.z - b.x * a.z;
        }
        acc
    }

    /// Point-in-convex-polygon test (boundary counts as inside).
    pub fn contains(&self, p: Vec2) -> bool {
        if self.is_empty() {
            return false;
        }
        let n = self.vertices.len();
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let cross = (b.x - a.x) * (p.z - a.z) - (b.z - a.z) * (p.x - a.x);
            if cross < -1e-6 * (1.0 + p.x.abs() + p.z.abs()) {
                return false;
            }
        }
        true
    }
}

// ── Event Estimate ────────────────────────────────────────────────────────────

/// Conditions observed while fusing a batch. Logged, never thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstimateFlag {
    /// `|det A|` below threshold; point estimate fell back to the
    /// centroid of ray origins and the error radius is +inf.
    IllConditioned,
    /// The observers' wedges are mutually disjoint; no polygon.
    EmptyFeasibleRegion,
    /// The configured estimator overran its deadline and the linear
    /// radius was substituted.
    EstimatorDegraded,
}

/// The fused result for one coincidence batch. Immutable after emission;
/// the log and chat sinks only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEstimate {
    pub x: f64,
    pub z: f64,
    /// Mean hint height of the batch, metadata only
    pub y: f64,
    /// Worst-case or 1-sigma radius depending on the configured
    /// estimator; +inf when ill-conditioned.
    pub error_radius: f64,
    /// Intersection of every observer's wedge, when non-empty.
    pub feasible_region: Option<Polygon>,
    pub flags: Vec<EstimateFlag>,
    pub observations: Vec<Observation>,
    /// Timestamp of the first hint in the batch (milliseconds)
    pub sealed_at_ms: u64,
}

impl EventEstimate {
    pub fn is_flagged(&self, flag: EstimateFlag) -> bool {
        self.flags.contains(&flag)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Recoverable fusion failures. These never cross the pipeline boundary
/// as panics; the orchestrator logs them and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FusionError {
    /// Batch sealed with fewer than two usable observations.
    #[error("insufficient observations: got {got}, need at least 2")]
    InsufficientObservations { got: usize },
    /// Observer sits inside the hint's own unit square, so the angular
    /// wedge is undefined. Cannot happen for a real far-away event.
    #[error("degenerate observation from {observer_id}: observer inside hint square")]
    DegenerateObservation { observer_id: String },
}
