//! End-to-end fusion scenarios: synthesize hints the way the server
//! emits them, fuse, and compare against ground truth.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use wither_geom::estimate::EstimatorKind;
use wither_geom::fusion::{fuse_batch, RegionMode};
use wither_geom::hint::project_hint;
use wither_geom::pattern::{synthesize_batch, Pattern};
use wither_geom::ray::{observation_to_ray, observation_to_wedge, RayChoice};
use wither_types::{EstimateFlag, Observation, Vec2};

const VIEW: f64 = 160.0;

fn grid_batch(event: Vec2) -> Vec<Observation> {
    synthesize_batch(Pattern::Grid, 4, 160_000.0, event, VIEW, 0)
}

// ── S1: symmetric 4-corner grid ──────────────────────────────────────────────

#[test]
fn s1_symmetric_grid_recovers_event() {
    let event = Vec2::new(250_000.0, -150_000.0);
    let batch = grid_batch(event);
    let est = EstimatorKind::Linear.build(0.5);
    let out = fuse_batch(&batch, est.as_ref(), RegionMode::Intersection).unwrap();

    assert!(out.point.dist(event) < 2_000.0, "estimate {:?}", out.point);
    assert!(out.region.is_some());
    assert!(out.error_radius.is_finite());
}

// ── S2: degenerate colinear pair ─────────────────────────────────────────────

#[test]
fn s2_colinear_pair_flags_ill_conditioned() {
    // Observers face each other down one line; the event sits between
    // them, so both sight-lines are antiparallel and A loses rank.
    let batch = vec![
        Observation {
            observer_id: "west".into(),
            observer_pos: Vec2::new(0.0, 0.5),
            observer_y: 64.0,
            hint: (160, 0),
            hint_y: 64,
            observed_at_ms: 0,
        },
        Observation {
            observer_id: "east".into(),
            observer_pos: Vec2::new(1_000.0, 0.5),
            observer_y: 64.0,
            hint: (839, 0),
            hint_y: 64,
            observed_at_ms: 10,
        },
    ];
    let est = EstimatorKind::Linear.build(0.5);
    let out = fuse_batch(&batch, est.as_ref(), RegionMode::Intersection).unwrap();
    assert!(out.flags.contains(&EstimateFlag::IllConditioned));
    assert!(out.error_radius.is_infinite());
}

// ── S3: mutually inconsistent hints ──────────────────────────────────────────

#[test]
fn s3_disjoint_wedges_flagged_but_estimate_defined() {
    // Each observer's hint points outward to its own quadrant; no point
    // satisfies any two of them, but the bundle itself is well-spread.
    let positions = [
        Vec2::new(80_000.0, 80_000.0),
        Vec2::new(-80_000.0, 80_000.0),
        Vec2::new(-80_000.0, -80_000.0),
        Vec2::new(80_000.0, -80_000.0),
    ];
    let batch: Vec<Observation> = positions
        .iter()
        .enumerate()
        .map(|(i, &pos)| {
            let fake_event = pos.scale(3.0);
            Observation {
                observer_id: format!("o{i}"),
                observer_pos: pos,
                observer_y: 64.0,
                hint: project_hint(fake_event, pos, VIEW),
                hint_y: 64,
                observed_at_ms: 0,
            }
        })
        .collect();

    let est = EstimatorKind::Linear.build(0.5);
    let out = fuse_batch(&batch, est.as_ref(), RegionMode::Intersection).unwrap();
    assert!(out.flags.contains(&EstimateFlag::EmptyFeasibleRegion));
    assert!(!out.flags.contains(&EstimateFlag::IllConditioned));
    assert!(out.point.x.is_finite() && out.point.z.is_finite());
    assert!(out.region.is_none());
}

// ── S4: observation order invariance ─────────────────────────────────────────

#[test]
fn s4_shuffled_batches_agree_to_micro_block() {
    let event = Vec2::new(250_000.0, -150_000.0);
    let batch = grid_batch(event);
    let est = EstimatorKind::OptimizedCorner.build(0.5);
    let baseline = fuse_batch(&batch, est.as_ref(), RegionMode::Intersection).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let mut shuffled = batch;
    for _ in 0..10 {
        // Fisher–Yates
        for i in (1..shuffled.len()).rev() {
            let j = rng.gen_range(0..=i);
            shuffled.swap(i, j);
        }
        let out = fuse_batch(&shuffled, est.as_ref(), RegionMode::Intersection).unwrap();
        assert!(out.point.dist(baseline.point) < 1e-6);
        assert!((out.error_radius - baseline.error_radius).abs() < 1e-6);
    }
}

// ── S6: annulus sweep, linear vs optimized-corner ────────────────────────────

#[test]
fn s6_annulus_medians_agree_within_one_percent() {
    let mut rng = StdRng::seed_from_u64(42);
    let observers: Vec<Vec2> = vec![
        Vec2::new(5_000_000.0, 5_000_000.0),
        Vec2::new(-5_000_000.0, 5_000_000.0),
        Vec2::new(-5_000_000.0, -5_000_000.0),
        Vec2::new(5_000_000.0, -5_000_000.0),
    ];

    let linear = EstimatorKind::Linear.build(0.5);
    let corner = EstimatorKind::OptimizedCorner.build(0.5);
    let mut err_linear = Vec::new();
    let mut err_corner = Vec::new();

    for _ in 0..1_000 {
        let r = rng.gen_range(1_000.0..10_000_000.0f64);
        let theta = rng.gen_range(0.0..std::f64::consts::TAU);
        let event = Vec2::new(r * theta.cos(), r * theta.sin());

        let batch: Vec<Observation> = observers
            .iter()
            .enumerate()
            .map(|(i, &pos)| Observation {
                observer_id: format!("o{i}"),
                observer_pos: pos,
                observer_y: 64.0,
                hint: project_hint(event, pos, VIEW),
                hint_y: 64,
                observed_at_ms: 0,
            })
            .collect();

        let a = fuse_batch(&batch, linear.as_ref(), RegionMode::Intersection).unwrap();
        let b = fuse_batch(&batch, corner.as_ref(), RegionMode::Intersection).unwrap();
        if a.flags.contains(&EstimateFlag::IllConditioned)
            || b.flags.contains(&EstimateFlag::IllConditioned)
        {
            continue;
        }
        err_linear.push(a.point.dist(event));
        err_corner.push(b.point.dist(event));
    }

    let med = |v: &mut Vec<f64>| -> f64 {
        v.sort_by(|a, b| a.partial_cmp(b).unwrap());
        v[v.len() / 2]
    };
    let m_lin = med(&mut err_linear);
    let m_cor = med(&mut err_corner);
    assert!(
        (m_lin - m_cor).abs() <= 0.01 * m_cor.max(1e-9),
        "median linear {m_lin} vs optimized {m_cor}"
    );
}

// ── Invariant: translation equivariance ──────────────────────────────────────

#[test]
fn translation_shifts_estimate_and_keeps_radius() {
    let event = Vec2::new(250_000.0, -150_000.0);
    let batch = grid_batch(event);
    let shift = (12_345i32, -6_789i32);

    let shifted: Vec<Observation> = batch
        .iter()
        .map(|o| Observation {
            observer_pos: o.observer_pos.add(Vec2::new(shift.0 as f64, shift.1 as f64)),
            hint: (o.hint.0 + shift.0, o.hint.1 + shift.1),
            ..o.clone()
        })
        .collect();

    let est = EstimatorKind::Linear.build(0.5);
    let a = fuse_batch(&batch, est.as_ref(), RegionMode::Intersection).unwrap();
    let b = fuse_batch(&shifted, est.as_ref(), RegionMode::Intersection).unwrap();

    let expected = a.point.add(Vec2::new(shift.0 as f64, shift.1 as f64));
    assert!(b.point.dist(expected) < 1e-5);
    assert!((a.error_radius - b.error_radius).abs() < 1e-5);
}

// ── Invariant: wedge containment of the estimate ─────────────────────────────

#[test]
fn estimate_lies_in_every_wedge_of_a_consistent_batch() {
    let event = Vec2::new(1_234_567.0, 987_654.0);
    let batch = synthesize_batch(Pattern::Circle, 6, 200_000.0, event, VIEW, 0);
    let est = EstimatorKind::Linear.build(0.5);
    let out = fuse_batch(&batch, est.as_ref(), RegionMode::Intersection).unwrap();
    assert!(!out.flags.contains(&EstimateFlag::EmptyFeasibleRegion));

    for obs in &out.used {
        let wedge = observation_to_wedge(obs).unwrap();
        assert!(
            wedge.contains_point(out.point),
            "estimate outside wedge of {}",
            obs.observer_id
        );
    }
}

// ── Invariant: hint round-trip keeps the event on the ray ────────────────────

#[test]
fn single_ray_round_trip_passes_near_event() {
    let event = Vec2::new(-3_000_000.0, 1_750_000.0);
    let observer = Vec2::new(40_000.0, -20_000.0);
    let obs = Observation {
        observer_id: "rt".into(),
        observer_pos: observer,
        observer_y: 64.0,
        hint: project_hint(event, observer, VIEW),
        hint_y: 64,
        observed_at_ms: 0,
    };

    let ray = observation_to_ray(&obs, RayChoice::Center).unwrap();
    let to_event = event.sub(ray.origin);
    let along = to_event.dot(ray.direction);
    assert!(along > 0.0, "event behind the ray");
    let perp = to_event.sub(ray.direction.scale(along)).norm();
    // Worst angular error is the square's half-diagonal over the view
    // distance; the perpendicular miss grows linearly with range.
    let bound = to_event.norm() * (0.75 / VIEW);
    assert!(perp <= bound, "perpendicular miss {perp} > {bound}");
}
