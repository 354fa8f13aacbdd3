//! main.rs — Wither Locator simulator entry point
//!
//! Two modes:
//!   - `--serve`: run a fleet of synthetic observer sources (one TCP
//!     ndjson endpoint each) and emit hint envelopes for random spawn
//!     events, so a live backend can be exercised end to end.
//!   - default (sweep): offline accuracy harness — synthesize events,
//!     fuse them directly, and report recovered-vs-true error
//!     statistics, optionally rendering a diagnostic PNG per batch.

mod event_gen;
mod scenarios;
mod source;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use wither_geom::estimate::EstimatorKind;
use wither_geom::fusion::{fuse_batch, RegionMode};
use wither_geom::pattern::Pattern;
use wither_geom::plot::DiagnosticScene;
use wither_types::{Observation, Vec2};

use event_gen::{fleet_positions, plan_event, EventSampler};
use scenarios::{preset, ScenarioConfig, ScenarioType};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "wither-sim", about = "Wither Locator synthetic observer fleet")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Serve live observer sources instead of running the offline sweep
    #[arg(long)]
    serve: bool,
    /// Scenario preset: default, dropout, jitter, poisoned, colinear,
    /// double_event
    #[arg(long, default_value = "default")]
    scenario: String,
    /// Sweep only: number of events (overrides config)
    #[arg(long)]
    events: Option<usize>,
    /// RNG seed for reproducible runs
    #[arg(long, default_value = "1337")]
    seed: u64,
    /// Sweep only: write a diagnostic PNG per batch into this directory
    #[arg(long)]
    plot_dir: Option<String>,
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct FullConfig {
    fleet: FleetConfig,
    world: WorldConfig,
    sweep: SweepConfig,
}

#[derive(Debug, serde::Deserialize)]
struct FleetConfig {
    observers: usize,
    extent_blocks: f64,
    view_distance_blocks: f64,
    base_port: u16,
    event_interval_s: f64,
    pattern: Pattern,
}

#[derive(Debug, serde::Deserialize)]
struct WorldConfig {
    r_min: f64,
    r_max: f64,
}

#[derive(Debug, serde::Deserialize)]
struct SweepConfig {
    events: usize,
    estimator: EstimatorKind,
    #[serde(default = "default_sigma")]
    sigma: f64,
}

fn default_sigma() -> f64 {
    0.5
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wither_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.config)
        .unwrap_or_else(|_| include_str!("../config.toml").to_string());
    let cfg: FullConfig = toml::from_str(&raw).context("parsing simulator config")?;

    let Some(scenario) = preset(&args.scenario) else {
        bail!("unknown scenario preset '{}'", args.scenario);
    };

    info!(
        observers = cfg.fleet.observers,
        pattern = ?cfg.fleet.pattern,
        scenario = %args.scenario,
        "wither simulator starting"
    );

    if args.serve {
        serve_fleet(&cfg, scenario, args.seed).await
    } else {
        sweep(&cfg, scenario, &args)
    }
}

// ── Serve mode ────────────────────────────────────────────────────────────────

async fn serve_fleet(cfg: &FullConfig, scenario: ScenarioConfig, seed: u64) -> Result<()> {
    let positions = fleet_positions(
        cfg.fleet.pattern,
        cfg.fleet.observers,
        cfg.fleet.extent_blocks,
        &scenario,
    );

    let mut feeds = Vec::with_capacity(positions.len());
    for idx in 0..positions.len() {
        let port = cfg.fleet.base_port + idx as u16;
        feeds.push(
            source::start_observer_source(idx, port)
                .await
                .with_context(|| format!("binding observer source {idx}"))?,
        );
    }

    let mut sampler = EventSampler::new(seed, cfg.world.r_min, cfg.world.r_max);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(cfg.fleet.event_interval_s));
    let mut event_counter: u64 = 0;

    loop {
        ticker.tick().await;
        event_counter += 1;
        let event = sampler.sample();
        info!(
            n = event_counter,
            x = event.x as i64,
            z = event.z as i64,
            "spawning synthetic event"
        );
        emit_event(cfg, &scenario, &positions, &feeds, &mut sampler, event).await;

        if scenario.has(ScenarioType::DoubleEvent) {
            tokio::time::sleep(Duration::from_secs_f64(scenario.double_event_gap_s)).await;
            let second = sampler.sample();
            info!(x = second.x as i64, z = second.z as i64, "second event of pair");
            emit_event(cfg, &scenario, &positions, &feeds, &mut sampler, second).await;
        }
    }
}

async fn emit_event(
    cfg: &FullConfig,
    scenario: &ScenarioConfig,
    positions: &[Vec2],
    feeds: &[source::ObserverFeed],
    sampler: &mut EventSampler,
    event: Vec2,
) {
    let t_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    let plan = plan_event(
        event,
        positions,
        cfg.fleet.view_distance_blocks,
        t_ms,
        scenario,
        sampler.rng(),
    );

    for emission in plan {
        let feed = feeds[emission.observer_idx].clone();
        let line = match serde_json::to_string(&emission.envelope) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "envelope serialize failed");
                continue;
            }
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(emission.delay_ms)).await;
            feed.send_line(line);
        });
    }
}

// ── Sweep mode ────────────────────────────────────────────────────────────────

fn sweep(cfg: &FullConfig, scenario: ScenarioConfig, args: &Args) -> Result<()> {
    let n_events = args.events.unwrap_or(cfg.sweep.events);
    let estimator = cfg.sweep.estimator.build(cfg.sweep.sigma);
    let positions = fleet_positions(
        cfg.fleet.pattern,
        cfg.fleet.observers,
        cfg.fleet.extent_blocks,
        &scenario,
    );

    if let Some(dir) = &args.plot_dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut sampler = EventSampler::new(args.seed, cfg.world.r_min, cfg.world.r_max);
    let mut errors: Vec<f64> = Vec::with_capacity(n_events);
    let mut radii: Vec<f64> = Vec::new();
    let mut ill_conditioned = 0usize;
    let mut empty_region = 0usize;
    let mut skipped = 0usize;

    for i in 0..n_events {
        let event = sampler.sample();
        let plan = plan_event(
            event,
            &positions,
            cfg.fleet.view_distance_blocks,
            0,
            &scenario,
            sampler.rng(),
        );
        let batch: Vec<Observation> = plan
            .into_iter()
            .map(|p| p.envelope.into_observation())
            .collect();

        let outcome = match fuse_batch(&batch, estimator.as_ref(), RegionMode::Intersection) {
            Ok(o) => o,
            Err(e) => {
                warn!(event = i, error = %e, "batch unfusable");
                skipped += 1;
                continue;
            }
        };

        if outcome
            .flags
            .contains(&wither_types::EstimateFlag::IllConditioned)
        {
            ill_conditioned += 1;
        } else {
            errors.push(outcome.point.dist(event));
            radii.push(outcome.error_radius);
        }
        if outcome
            .flags
            .contains(&wither_types::EstimateFlag::EmptyFeasibleRegion)
        {
            empty_region += 1;
        }

        if let Some(dir) = &args.plot_dir {
            let scene = DiagnosticScene {
                observations: &outcome.used,
                estimate: outcome.point,
                error_radius: outcome.error_radius,
                region: outcome.region.as_ref(),
                truth: Some(event),
            };
            let path = std::path::Path::new(dir).join(format!("event_{i:05}.png"));
            if let Err(e) = wither_geom::plot::save_png(&scene, 1024, &path) {
                warn!(error = %e, "plot failed");
            }
        }
    }

    errors.sort_by(f64::total_cmp);
    let pct = |v: &[f64], p: f64| -> f64 {
        if v.is_empty() {
            f64::NAN
        } else {
            v[((v.len() - 1) as f64 * p) as usize]
        }
    };

    info!(
        events = n_events,
        estimator = %cfg.sweep.estimator,
        fused = errors.len(),
        skipped,
        ill_conditioned,
        empty_region,
        "sweep complete"
    );
    info!(
        median = format!("{:.1}", pct(&errors, 0.5)),
        p90 = format!("{:.1}", pct(&errors, 0.9)),
        worst = format!("{:.1}", pct(&errors, 1.0)),
        "point error (blocks)"
    );
    if !radii.is_empty() {
        let mean_radius = radii.iter().sum::<f64>() / radii.len() as f64;
        info!(mean_radius = format!("{mean_radius:.1}"), "reported error radius");
    }
    Ok(())
}
