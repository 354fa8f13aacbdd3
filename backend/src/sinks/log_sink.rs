//! log_sink.rs — Persistent event log
//!
//! One SQLite table, one row per fused batch, committed per insert.
//! The core never reads it back; protest review and mapping tooling do.

use rusqlite::{params, Connection};
use tokio::sync::mpsc;
use tracing::{info, warn};
use wither_types::EventEstimate;

use super::{retry_backoff, QUEUE_WARN_DEPTH, SINK_ATTEMPTS};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS wither_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    server        TEXT NOT NULL,
    x             REAL NOT NULL,
    y             REAL NOT NULL,
    z             REAL NOT NULL,
    ts            INTEGER NOT NULL,
    error_radius  REAL,
    flags         TEXT NOT NULL
)";

/// Spawn the log writer. The returned handle completes once the queue
/// senders are dropped and the backlog is drained.
pub fn spawn(
    database_path: String,
    server_label: String,
    rx: mpsc::UnboundedReceiver<EventEstimate>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let conn = match Connection::open(&database_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %database_path, error = %e, "log sink could not open database");
                drain_and_count(rx);
                return;
            }
        };
        if let Err(e) = conn.execute(SCHEMA, []) {
            warn!(error = %e, "log sink could not create table");
            drain_and_count(rx);
            return;
        }
        run_writer(&conn, &server_label, rx);
    })
}

/// Blocking writer loop. Separated from `spawn` so tests can drive it
/// against an in-memory database.
pub fn run_writer(
    conn: &Connection,
    server_label: &str,
    mut rx: mpsc::UnboundedReceiver<EventEstimate>,
) {
    let mut dropped: u64 = 0;
    while let Some(estimate) = rx.blocking_recv() {
        let depth = rx.len();
        if depth > QUEUE_WARN_DEPTH {
            warn!(depth, "log sink queue backing up");
        }
        if !insert_with_retry(conn, server_label, &estimate) {
            dropped += 1;
            warn!(dropped, "log sink dropped an estimate after retries");
        }
    }
    if dropped > 0 {
        warn!(dropped, "log sink finished with dropped estimates");
    } else {
        info!("log sink drained");
    }
}

fn insert_with_retry(conn: &Connection, server_label: &str, estimate: &EventEstimate) -> bool {
    let flags = estimate
        .flags
        .iter()
        .map(|f| format!("{f:?}"))
        .collect::<Vec<_>>()
        .join(",");
    let radius: Option<f64> = estimate
        .error_radius
        .is_finite()
        .then_some(estimate.error_radius);

    for attempt in 0..SINK_ATTEMPTS {
        let result = conn.execute(
            "INSERT INTO wither_events (server, x, y, z, ts, error_radius, flags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                server_label,
                estimate.x,
                estimate.y,
                estimate.z,
                estimate.sealed_at_ms as i64,
                radius,
                flags,
            ],
        );
        match result {
            Ok(_) => return true,
            Err(e) => {
                warn!(attempt, error = %e, "log insert failed");
                std::thread::sleep(retry_backoff(attempt));
            }
        }
    }
    false
}

fn drain_and_count(mut rx: mpsc::UnboundedReceiver<EventEstimate>) {
    let mut dropped = 0u64;
    while rx.blocking_recv().is_some() {
        dropped += 1;
    }
    warn!(dropped, "log sink unavailable, estimates dropped");
}
