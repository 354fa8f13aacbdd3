//! region.rs — Feasible-region solver
//!
//! Intersects the observers' angular wedges into a convex polygon by
//! Sutherland–Hodgman clipping against each wedge's two bounding
//! half-planes, starting from a huge bounding square. An empty result
//! means the observations are mutually inconsistent (measurement error,
//! clock skew, or two events colliding in one batch).
//!
//! The pairwise mode intersects every wedge pair instead and returns the
//! union of those lens-shaped cells: the set of points at least two
//! observers agree on, which survives one poisoned or skewed observer.

use wither_types::{Polygon, Vec2};

use crate::ray::{HalfPlane, Wedge};

/// Half-extent of the initial bounding square. Far beyond any reachable
/// block coordinate.
pub const REGION_BOUND: f64 = 1e9;

/// Crossing-parameter denominators below this mean the edge runs along
/// the clip line; no crossing vertex is emitted.
const CROSS_DENOM_EPS: f64 = 1e-12;

fn bounding_square() -> Polygon {
    let b = REGION_BOUND;
    Polygon {
        vertices: vec![
            Vec2::new(-b, -b),
            Vec2::new(b, -b),
            Vec2::new(b, b),
            Vec2::new(-b, b),
        ],
    }
}

/// One Sutherland–Hodgman pass: clip `poly` to the half-plane.
/// Preserves counter-clockwise order; collapses adjacent duplicates so a
/// vertex lying exactly on the line is emitted once, never twice.
pub fn clip_polygon(poly: &Polygon, hp: &HalfPlane) -> Polygon {
    let n = poly.vertices.len();
    if n == 0 {
        return Polygon::default();
    }

    let mut out: Vec<Vec2> = Vec::with_capacity(n + 2);
    for i in 0..n {
        let curr = poly.vertices[i];
        let next = poly.vertices[(i + 1) % n];
        let curr_in = hp.contains(curr);
        let next_in = hp.contains(next);

        if curr_in {
            push_dedup(&mut out, curr);
        }
        if curr_in != next_in {
            let denom = hp.a * (next.x - curr.x) + hp.b * (next.z - curr.z);
            if denom.abs() >= CROSS_DENOM_EPS {
                let alpha = (hp.c - (hp.a * curr.x + hp.b * curr.z)) / denom;
                if (0.0..=1.0).contains(&alpha) {
                    let crossing = Vec2::new(
                        curr.x + alpha * (next.x - curr.x),
                        curr.z + alpha * (next.z - curr.z),
                    );
                    push_dedup(&mut out, crossing);
                }
            }
        }
    }

    // The wrap-around edge can duplicate the first vertex at the tail.
    if out.len() > 1 && nearly_equal(out[0], *out.last().unwrap()) {
        out.pop();
    }
    if out.len() < 3 {
        return Polygon::default();
    }
    Polygon { vertices: out }
}

fn nearly_equal(a: Vec2, b: Vec2) -> bool {
    let scale = 1.0 + a.x.abs() + a.z.abs();
    (a.x - b.x).abs() <= 1e-9 * scale && (a.z - b.z).abs() <= 1e-9 * scale
}

fn push_dedup(out: &mut Vec<Vec2>, v: Vec2) {
    if let Some(&last) = out.last() {
        if nearly_equal(last, v) {
            return;
        }
    }
    out.push(v);
}

/// Intersect all wedges. Empty polygon ⇔ no point satisfies every
/// observation.
pub fn feasible_region(wedges: &[Wedge]) -> Polygon {
    let mut poly = bounding_square();
    for wedge in wedges {
        for hp in wedge.half_planes() {
            poly = clip_polygon(&poly, &hp);
            if poly.is_empty() {
                return Polygon::default();
            }
        }
    }
    poly
}

/// Pairwise mode: every C(n,2) wedge-pair intersection, each clipped to
/// the bounding square. The union of the returned cells is the "at
/// least two observers agree" region; one outlier cannot empty it.
pub fn pairwise_regions(wedges: &[Wedge]) -> Vec<Polygon> {
    let mut cells = Vec::new();
    for i in 0..wedges.len() {
        for j in (i + 1)..wedges.len() {
            let mut poly = bounding_square();
            for hp in wedges[i]
                .half_planes()
                .iter()
                .chain(wedges[j].half_planes().iter())
            {
                poly = clip_polygon(&poly, hp);
                if poly.is_empty() {
                    break;
                }
            }
            if !poly.is_empty() {
                cells.push(poly);
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hint::project_hint;
    use crate::ray::observation_to_wedge;
    use wither_types::Observation;

    fn synth_obs(id: &str, pos: Vec2, event: Vec2) -> Observation {
        Observation {
            observer_id: id.into(),
            observer_pos: pos,
            observer_y: 64.0,
            hint: project_hint(event, pos, 160.0),
            hint_y: 64,
            observed_at_ms: 0,
        }
    }

    fn wedges_for(event: Vec2, positions: &[Vec2]) -> Vec<Wedge> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &p)| observation_to_wedge(&synth_obs(&format!("o{i}"), p, event)).unwrap())
            .collect()
    }

    const GRID: [Vec2; 4] = [
        Vec2 { x: 80_000.0, z: 80_000.0 },
        Vec2 { x: -80_000.0, z: 80_000.0 },
        Vec2 { x: 80_000.0, z: -80_000.0 },
        Vec2 { x: -80_000.0, z: -80_000.0 },
    ];

    #[test]
    fn consistent_wedges_contain_the_event() {
        let event = Vec2::new(250_000.0, -150_000.0);
        let wedges = wedges_for(event, &GRID);
        let region = feasible_region(&wedges);
        assert!(!region.is_empty());
        assert!(region.contains(event));
    }

    #[test]
    fn region_is_convex_ccw_without_duplicates() {
        let event = Vec2::new(1_500_000.0, 2_250_000.0);
        let wedges = wedges_for(event, &GRID);
        let region = feasible_region(&wedges);
        assert!(!region.is_empty());
        assert!(region.signed_area2() > 0.0);

        let n = region.vertices.len();
        for i in 0..n {
            let a = region.vertices[i];
            let b = region.vertices[(i + 1) % n];
            let c = region.vertices[(i + 2) % n];
            assert!(!nearly_equal(a, b), "duplicate adjacent vertices");
            // CCW convexity: every turn is a left turn (or straight).
            let cross = (b.x - a.x) * (c.z - b.z) - (b.z - a.z) * (c.x - b.x);
            let scale = b.sub(a).norm() * c.sub(b).norm();
            assert!(cross >= -1e-9 * scale - 1e-6, "reflex vertex at {i}");
        }
    }

    #[test]
    fn disjoint_wedges_yield_empty_region() {
        // One wedge hugs the +x axis, the other points due +z from a
        // position north of it; their slivers can never meet.
        let east = wedges_for(Vec2::new(500_000.0, 0.0), &[Vec2::new(0.0, 0.0)]);
        let north = wedges_for(Vec2::new(0.0, 500_000.0), &[Vec2::new(0.0, 10_000.0)]);
        let wedges = vec![east[0], north[0]];
        let region = feasible_region(&wedges);
        assert!(region.is_empty());
    }

    #[test]
    fn pairwise_mode_survives_one_outlier() {
        let event = Vec2::new(250_000.0, -150_000.0);
        let mut wedges = wedges_for(event, &GRID);
        // Poison one observer with a hint toward the opposite bearing.
        let poisoned = wedges_for(Vec2::new(-400_000.0, 300_000.0), &[GRID[0]]);
        wedges[0] = poisoned[0];

        assert!(feasible_region(&wedges).is_empty());

        let cells = pairwise_regions(&wedges);
        // The three honest observers still pairwise-agree around the event.
        assert!(cells.iter().any(|c| c.contains(event)));
    }

    #[test]
    fn clip_keeps_full_square_for_permissive_plane() {
        let square = bounding_square();
        // x ≤ 2B keeps everything.
        let hp = HalfPlane { a: 1.0, b: 0.0, c: 2.0 * REGION_BOUND };
        let clipped = clip_polygon(&square, &hp);
        assert_eq!(clipped.vertices.len(), 4);
    }
}
