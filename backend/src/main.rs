//! main.rs — Wither Locator backend entry point
//!
//! Wiring order: config → sinks → status surface → observer sessions →
//! orchestrator loop. Shutdown reverses it: signal the sessions, let the
//! orchestrator flush its pending batch, then drain the sink queues
//! under a bounded deadline.

mod config;
mod gate;
mod observer;
mod orchestrator;
mod sinks;
mod status;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use config::Config;
use observer::ObserverEndpoint;
use orchestrator::Orchestrator;
use status::StatusHandle;

const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "wither-backend", about = "Wither-spawn locator pipeline")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Override the configured estimator (exhaustive, optimized_corner,
    /// linear, covariance)
    #[arg(long)]
    estimator: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wither_backend=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(est) = &args.estimator {
        cfg.locator.estimator = match est.as_str() {
            "exhaustive" => wither_geom::EstimatorKind::Exhaustive,
            "optimized_corner" => wither_geom::EstimatorKind::OptimizedCorner,
            "linear" => wither_geom::EstimatorKind::Linear,
            "covariance" => wither_geom::EstimatorKind::Covariance,
            other => anyhow::bail!("unknown estimator '{other}'"),
        };
    }

    info!(
        server = %cfg.locator.server_label,
        observers = cfg.observers.endpoints.len(),
        estimator = %cfg.locator.estimator,
        window_ms = cfg.locator.batch_window_ms,
        "wither locator starting"
    );

    if cfg.diagnostics.enabled {
        std::fs::create_dir_all(&cfg.diagnostics.out_dir)?;
    }

    // Sinks first so every estimate has somewhere to go.
    let (log_tx, log_rx) = mpsc::unbounded_channel();
    let log_handle = sinks::log_sink::spawn(
        cfg.log.database_path.clone(),
        cfg.locator.server_label.clone(),
        log_rx,
    );

    let (chat_tx, chat_handle) = if cfg.chat.webhook_url.is_empty() {
        info!("chat sink disabled (no webhook_url)");
        (None, None)
    } else {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = sinks::chat_sink::spawn(
            cfg.chat.webhook_url.clone(),
            cfg.chat.channel_id.clone(),
            cfg.locator.server_label.clone(),
            rx,
        );
        (Some(tx), Some(handle))
    };

    let status_handle = StatusHandle::default();
    tokio::spawn(status::serve(status_handle.clone(), cfg.status.port));

    // Observer sessions feed one merged channel.
    let (event_tx, event_rx) = mpsc::channel(1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut session_handles = Vec::new();
    for (i, addr) in cfg.observers.endpoints.iter().enumerate() {
        let endpoint = ObserverEndpoint {
            id: format!("obs-{i}"),
            addr: addr.clone(),
        };
        session_handles.push(tokio::spawn(observer::run_session(
            endpoint,
            event_tx.clone(),
            shutdown_rx.clone(),
        )));
    }
    drop(event_tx);

    let orchestrator = Orchestrator::new(&cfg, log_tx, chat_tx, status_handle);
    let orchestrator_task = tokio::spawn(orchestrator.run(event_rx, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown_tx.send(true)?;

    // Orchestrator flushes its pending batch, then the sink queues close
    // as their senders drop with it.
    if let Err(e) = orchestrator_task.await {
        warn!(error = %e, "orchestrator task failed");
    }
    for handle in session_handles {
        let _ = handle.await;
    }

    let drain = async {
        let _ = log_handle.await;
        if let Some(handle) = chat_handle {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(DRAIN_DEADLINE, drain).await.is_err() {
        warn!("sink drain exceeded {DRAIN_DEADLINE:?}, exiting anyway");
    }

    info!("goodbye");
    Ok(())
}
