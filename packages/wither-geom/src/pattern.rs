//! pattern.rs — Synthetic observer layouts
//!
//! Deterministic observer placements for tests and backfill sweeps:
//! circle, grid, axis cross, diagonal cross. Hints are synthesized the
//! way the server would emit them, so a generated batch carries exact
//! ground truth.

use serde::{Deserialize, Serialize};
use wither_types::{Observation, Vec2};

use crate::hint::project_hint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Regular circle of radius extent/2 around the origin.
    Circle,
    /// ⌈√n⌉-column grid over [−extent/2, extent/2]².
    Grid,
    /// Horizontal + vertical arms through the origin.
    Cross,
    /// X-shaped diagonal arms through the origin.
    DiagonalCross,
}

/// Place `n` observers over the given outer extent (blocks).
pub fn observer_positions(pattern: Pattern, n: usize, extent: f64) -> Vec<Vec2> {
    let half = extent / 2.0;
    match pattern {
        Pattern::Circle => (0..n)
            .map(|i| {
                let theta = 2.0 * std::f64::consts::PI * i as f64 / n.max(1) as f64;
                Vec2::new(half * theta.cos(), half * theta.sin())
            })
            .collect(),
        Pattern::Grid => {
            let cols = (n as f64).sqrt().ceil().max(1.0) as usize;
            let rows = n.div_ceil(cols);
            (0..n)
                .map(|i| {
                    let col = i % cols;
                    let row = i / cols;
                    Vec2::new(
                        grid_coord(col, cols, half),
                        grid_coord(row, rows, half),
                    )
                })
                .collect()
        }
        Pattern::Cross => arm_layout(n, half, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)),
        Pattern::DiagonalCross => {
            let d = std::f64::consts::FRAC_1_SQRT_2;
            arm_layout(n, half, Vec2::new(d, d), Vec2::new(d, -d))
        }
    }
}

fn grid_coord(idx: usize, count: usize, half: f64) -> f64 {
    if count <= 1 {
        0.0
    } else {
        -half + extent_step(half, count) * idx as f64
    }
}

fn extent_step(half: f64, count: usize) -> f64 {
    2.0 * half / (count - 1) as f64
}

/// Alternate points along two arms through the origin, sweeping each arm
/// end to end. Skips the exact origin so no observer sits on top of the
/// crossing point twice.
fn arm_layout(n: usize, half: f64, dir_a: Vec2, dir_b: Vec2) -> Vec<Vec2> {
    let per_arm = n.div_ceil(2);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let dir = if i % 2 == 0 { dir_a } else { dir_b };
        let slot = i / 2;
        let t = if per_arm <= 1 {
            half
        } else {
            -half + extent_step(half, per_arm) * slot as f64
        };
        let t = if t == 0.0 { half / per_arm.max(1) as f64 } else { t };
        out.push(dir.scale(t));
    }
    out
}

/// Synthesize a full coincidence batch for a known event: one
/// observation per generated observer, hints via the server-faithful
/// projection.
pub fn synthesize_batch(
    pattern: Pattern,
    n: usize,
    extent: f64,
    event: Vec2,
    view_distance: f64,
    base_t_ms: u64,
) -> Vec<Observation> {
    observer_positions(pattern, n, extent)
        .into_iter()
        .enumerate()
        .map(|(i, pos)| Observation {
            observer_id: format!("sim-{i}"),
            observer_pos: pos,
            observer_y: 64.0,
            hint: project_hint(event, pos, view_distance),
            hint_y: 64,
            observed_at_ms: base_t_ms,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_has_requested_radius() {
        let pts = observer_positions(Pattern::Circle, 8, 100_000.0);
        assert_eq!(pts.len(), 8);
        for p in pts {
            assert!((p.norm() - 50_000.0).abs() < 1e-6);
        }
    }

    #[test]
    fn grid_spans_the_extent() {
        let pts = observer_positions(Pattern::Grid, 9, 10_000.0);
        assert_eq!(pts.len(), 9);
        let min_x = pts.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = pts.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(min_x, -5_000.0);
        assert_eq!(max_x, 5_000.0);
    }

    #[test]
    fn cross_points_sit_on_axes() {
        let pts = observer_positions(Pattern::Cross, 10, 40_000.0);
        for p in pts {
            assert!(p.x == 0.0 || p.z == 0.0);
            assert!(p.norm() > 0.0);
        }
    }

    #[test]
    fn synthesized_batch_carries_server_hints() {
        let event = Vec2::new(250_000.0, -150_000.0);
        let batch = synthesize_batch(Pattern::Grid, 4, 160_000.0, event, 160.0, 42);
        assert_eq!(batch.len(), 4);
        for obs in &batch {
            // All observers are far outside view distance, so hints sit
            // on the view circle, ~160 blocks from each observer.
            let hint_center = obs.hint_center();
            let d = hint_center.dist(obs.observer_pos);
            assert!((d - 160.0).abs() < 2.0, "hint at distance {d}");
            assert_eq!(obs.observed_at_ms, 42);
        }
    }
}
