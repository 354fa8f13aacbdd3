//! observer.rs — Observer session tasks
//!
//! One task per configured observer source. A source is an external
//! protocol client that has already filtered the game server's packet
//! stream down to wither-spawn hints; it serves them as ndjson
//! `HintEnvelope` lines over TCP.
//!
//! Sessions reconnect forever with exponential backoff. A dropped
//! observer never stops the pipeline: the gate just shrinks its quorum
//! until the session is back.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use wither_types::{HintEnvelope, Observation};

/// Events flowing from the session tasks into the orchestrator's single
/// consumer loop.
#[derive(Debug)]
pub enum SessionEvent {
    Hint(Observation),
    Up(String),
    Down(String),
}

#[derive(Debug, Clone)]
pub struct ObserverEndpoint {
    pub id: String,
    pub addr: String,
}

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Exponential backoff with a deterministic ±25% wobble so a fleet of
/// sessions does not reconnect in lockstep.
fn backoff_delay(attempt: u32) -> Duration {
    let base = INITIAL_BACKOFF.as_secs_f64() * BACKOFF_MULTIPLIER.powi(attempt as i32);
    let capped = base.min(MAX_BACKOFF.as_secs_f64());
    let wobble = if attempt % 2 == 0 { 1.25 } else { 0.75 };
    Duration::from_secs_f64((capped * wobble).max(0.1))
}

/// Run one observer session until shutdown. Connection failures back
/// off; a successful connect resets the attempt counter.
pub async fn run_session(
    endpoint: ObserverEndpoint,
    tx: mpsc::Sender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }

        match TcpStream::connect(&endpoint.addr).await {
            Ok(stream) => {
                info!(observer = %endpoint.id, addr = %endpoint.addr, "observer session up");
                attempt = 0;
                let _ = tx.send(SessionEvent::Up(endpoint.id.clone())).await;
                read_stream(&endpoint, stream, &tx, &mut shutdown).await;
                let _ = tx.send(SessionEvent::Down(endpoint.id.clone())).await;
                if *shutdown.borrow() {
                    return;
                }
                warn!(observer = %endpoint.id, "observer session lost, reconnecting");
            }
            Err(e) => {
                debug!(observer = %endpoint.id, error = %e, "connect failed");
            }
        }

        let delay = backoff_delay(attempt);
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}

/// Read ndjson lines until the peer closes, an I/O error, or shutdown.
async fn read_stream(
    endpoint: &ObserverEndpoint,
    stream: TcpStream,
    tx: &mpsc::Sender<SessionEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<HintEnvelope>(&line) {
                            Ok(env) => {
                                let obs = env.into_observation();
                                if obs.observer_id != endpoint.id {
                                    // Source speaks for exactly one observer;
                                    // trust the configured identity.
                                    debug!(
                                        observer = %endpoint.id,
                                        claimed = %obs.observer_id,
                                        "envelope observer_id mismatch"
                                    );
                                }
                                if tx.send(SessionEvent::Hint(obs)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(observer = %endpoint.id, error = %e, "malformed envelope");
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!(observer = %endpoint.id, error = %e, "read error");
                        return;
                    }
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert!(backoff_delay(0) <= Duration::from_secs(2));
        assert!(backoff_delay(3) > backoff_delay(1));
        // Deep attempts sit at the cap (± wobble).
        assert!(backoff_delay(30) <= Duration::from_secs(75));
        assert!(backoff_delay(30) >= Duration::from_secs(45));
    }

    #[tokio::test]
    async fn session_streams_envelopes_and_reports_down() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            use tokio::io::AsyncWriteExt;
            let env = serde_json::json!({
                "observer_id": "obs-1",
                "observer_pos": [80_000.0, 64.0, 80_000.0],
                "hint": [80_113, 70, 80_113],
                "t_ms": 1_000,
            });
            sock.write_all(format!("{env}\n").as_bytes()).await.unwrap();
            sock.shutdown().await.unwrap();
        });

        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let endpoint = ObserverEndpoint {
            id: "obs-1".into(),
            addr,
        };
        let handle = tokio::spawn(run_session(endpoint, tx, shutdown_rx));

        let up = rx.recv().await.unwrap();
        assert!(matches!(up, SessionEvent::Up(ref id) if id == "obs-1"));
        let hint = rx.recv().await.unwrap();
        match hint {
            SessionEvent::Hint(obs) => {
                assert_eq!(obs.hint, (80_113, 80_113));
                assert_eq!(obs.observed_at_ms, 1_000);
            }
            other => panic!("expected hint, got {other:?}"),
        }
        let down = rx.recv().await.unwrap();
        assert!(matches!(down, SessionEvent::Down(ref id) if id == "obs-1"));

        shutdown_tx.send(true).unwrap();
        let _ = handle.await;
    }
}
