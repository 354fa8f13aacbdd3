//! hint.rs — Server-faithful hint projection
//!
//! Reproduces, bit for bit, the coordinate hint the game server attaches
//! to a wither-spawn broadcast:
//!   - event within view distance: the event's own block position (floor)
//!   - event beyond view distance: the event projected onto the
//!     view-distance circle around the observer, then cast to int the way
//!     the server's runtime does (truncate toward zero)
//!
//! Used by the simulator to synthesize batches with known ground truth,
//! and by the harness to backfill test observations.

use wither_types::Vec2;

/// Epsilon guard on the integer cast. The server computes the projected
/// coordinate in floating point, so a value that is mathematically
/// 200100.0 can arrive as 200099.999999999 and cast to 200099. Matching
/// real hints requires reproducing that, not just `trunc`.
const CAST_EPS: f64 = 1e-9;

/// The server runtime's int cast: truncate toward zero, with the float
/// noise guard applied first. `-3.7 → -3`, `+3.7 → +3`.
pub fn server_int_cast(x: f64) -> i32 {
    if x >= 0.0 {
        (x - CAST_EPS).floor() as i32
    } else {
        (x + CAST_EPS).ceil() as i32
    }
}

/// Compute the hint an observer at `observer` would receive for an event
/// at `event`, under the given view distance (blocks).
///
/// Note the two rounding conventions: `floor` for a near event (its block
/// position), truncate-toward-zero for a projected far event. They differ
/// for negative coordinates; both are what the server actually does.
pub fn project_hint(event: Vec2, observer: Vec2, view_distance: f64) -> (i32, i32) {
    let delta = event.sub(observer);
    let dist_sq = delta.dot(delta);

    if dist_sq > view_distance * view_distance {
        let dist = dist_sq.sqrt();
        let rx = observer.x + (delta.x / dist) * view_distance;
        let rz = observer.z + (delta.z / dist) * view_distance;
        (server_int_cast(rx), server_int_cast(rz))
    } else {
        (event.x.floor() as i32, event.z.floor() as i32)
    }
}

/// True when the observer stands inside the hint's own unit square, in
/// which case no angular wedge exists. Real far-away events never
/// produce this; it guards against malformed input.
pub fn observer_inside_hint(observer: Vec2, hint: (i32, i32)) -> bool {
    let (rx, rz) = (hint.0 as f64, hint.1 as f64);
    observer.x >= rx && observer.x < rx + 1.0 && observer.z >= rz && observer.z < rz + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: Vec2 = Vec2 {
        x: 1_000_000.0,
        z: 1_000_000.0,
    };
    const VIEW: f64 = 160.0;

    // Captured from the real server with an event at (1e6, 1e6) and view
    // distance 160. The cast must reproduce every one of these exactly.
    const CAPTURED: [(f64, f64, i32, i32); 8] = [
        (200_000.0, 0.0, 200_099, 124),
        (0.0, -200_000.0, 102, -199_877),
        (0.0, 200_000.0, 124, 200_099),
        (-200_000.0, 0.0, -199_877, 102),
        (-100_000.0, -100_000.0, -99_886, -99_886),
        (100_000.0, 100_000.0, 100_113, 100_113),
        (100_000.0, -100_000.0, 100_101, -99_876),
        (-100_000.0, 100_000.0, -99_876, 100_101),
    ];

    #[test]
    fn far_projection_matches_captured_hints() {
        for (px, pz, ex_rx, ex_rz) in CAPTURED {
            let hint = project_hint(EVENT, Vec2::new(px, pz), VIEW);
            assert_eq!(hint, (ex_rx, ex_rz), "observer at ({px}, {pz})");
        }
    }

    #[test]
    fn near_event_is_floored_block_position() {
        let event = Vec2::new(-3.7, 10.2);
        let observer = Vec2::new(0.0, 0.0);
        // distance ~10.8 < 160, so the hint is the event's block position
        assert_eq!(project_hint(event, observer, VIEW), (-4, 10));
    }

    #[test]
    fn cast_truncates_toward_zero() {
        assert_eq!(server_int_cast(3.7), 3);
        assert_eq!(server_int_cast(-3.7), -3);
        assert_eq!(server_int_cast(200_099.999_999_999), 200_099);
        assert_eq!(server_int_cast(-199_876.999_999_999), -199_876);
    }

    #[test]
    fn inside_hint_square_detection() {
        assert!(observer_inside_hint(Vec2::new(10.5, -4.0), (10, -4)));
        assert!(!observer_inside_hint(Vec2::new(11.0, -4.0), (10, -4)));
        assert!(!observer_inside_hint(Vec2::new(9.999, -4.0), (10, -4)));
    }
}
