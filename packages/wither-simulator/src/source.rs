//! source.rs — Synthetic observer sources
//!
//! Serves each simulated observer as a TCP ndjson endpoint, exactly the
//! surface a real protocol client exposes to the backend. The backend's
//! observer sessions connect here; every planned emission is broadcast
//! to whoever is currently attached. Send errors drop the connection
//! and never stop the simulation.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// One observer's line feed. Cloneable handle for the emission loop.
#[derive(Clone)]
pub struct ObserverFeed {
    tx: Arc<broadcast::Sender<String>>,
}

impl ObserverFeed {
    pub fn send_line(&self, line: String) {
        // No subscribers is fine; the backend may still be connecting.
        let _ = self.tx.send(line);
    }
}

/// Bind one observer's listener and start its accept loop.
/// Returns the feed handle for the emission loop.
pub async fn start_observer_source(observer_idx: usize, port: u16) -> std::io::Result<ObserverFeed> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("observer obs-{observer_idx} source at {addr}");

    let (tx, _) = broadcast::channel::<String>(256);
    let tx = Arc::new(tx);
    let feed = ObserverFeed { tx: tx.clone() };

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("obs-{observer_idx}: session from {peer}");
                    let mut rx = tx.subscribe();
                    tokio::spawn(async move {
                        let mut stream = stream;
                        loop {
                            match rx.recv().await {
                                Ok(line) => {
                                    if stream.write_all(line.as_bytes()).await.is_err()
                                        || stream.write_all(b"\n").await.is_err()
                                    {
                                        debug!("obs-{observer_idx}: session to {peer} closed");
                                        return;
                                    }
                                }
                                Err(broadcast::error::RecvError::Lagged(n)) => {
                                    warn!("obs-{observer_idx}: session lagged, skipped {n} lines");
                                }
                                Err(broadcast::error::RecvError::Closed) => return,
                            }
                        }
                    });
                }
                Err(e) => {
                    warn!("obs-{observer_idx}: accept failed: {e}");
                }
            }
        }
    });

    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn connected_session_receives_broadcast_lines() {
        // Port 0 is not practical here (the feed needs a known port for
        // the backend), but for the test we bind manually first.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let feed = start_observer_source(9, port).await.unwrap();

        let stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        // Give the accept loop a beat to subscribe the session.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        feed.send_line("{\"probe\":1}".to_string());

        let mut lines = BufReader::new(stream).lines();
        let line = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            lines.next_line(),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        assert_eq!(line, "{\"probe\":1}");
    }
}
