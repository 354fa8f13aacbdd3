//! chat_sink.rs — Chat notifications
//!
//! Posts one embed per fused batch to a webhook. Single-writer queue:
//! the chat client is not safe to hammer from multiple tasks, and
//! best-effort ordering is all the channel promises.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wither_types::{EstimateFlag, EventEstimate};

use super::{retry_backoff, QUEUE_WARN_DEPTH, SINK_ATTEMPTS};

const COLOR_OK: u32 = 0x2e_cc71;
const COLOR_SUSPECT: u32 = 0xe6_7e22;

/// Spawn the chat writer. Completes when the queue closes and drains.
pub fn spawn(
    webhook_url: String,
    channel_id: String,
    server_label: String,
    mut rx: mpsc::UnboundedReceiver<EventEstimate>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut dropped: u64 = 0;
        while let Some(estimate) = rx.recv().await {
            let depth = rx.len();
            if depth > QUEUE_WARN_DEPTH {
                warn!(depth, "chat sink queue backing up");
            }
            let body = format_estimate(&channel_id, &server_label, &estimate);
            if !post_with_retry(&client, &webhook_url, &body).await {
                dropped += 1;
                warn!(dropped, "chat sink dropped a post after retries");
            }
        }
        info!(dropped, "chat sink drained");
    })
}

/// Build the webhook payload: channel routing, a color tag reflecting
/// estimate quality, and the coordinates with their radius.
pub fn format_estimate(
    channel_id: &str,
    server_label: &str,
    estimate: &EventEstimate,
) -> serde_json::Value {
    let suspect = estimate.is_flagged(EstimateFlag::IllConditioned)
        || estimate.is_flagged(EstimateFlag::EmptyFeasibleRegion);
    let color = if suspect { COLOR_SUSPECT } else { COLOR_OK };

    let radius_line = if estimate.error_radius.is_finite() {
        format!("±{:.0} blocks", estimate.error_radius)
    } else {
        "radius unbounded (degenerate geometry)".to_string()
    };
    let mut body = format!(
        "x: **{:.0}**  z: **{:.0}**  (y≈{:.0})\n{}\nobservers: {}",
        estimate.x,
        estimate.z,
        estimate.y,
        radius_line,
        estimate.observations.len(),
    );
    if suspect {
        body.push_str("\n⚠ flags: ");
        body.push_str(
            &estimate
                .flags
                .iter()
                .map(|f| format!("{f:?}"))
                .collect::<Vec<_>>()
                .join(", "),
        );
    }

    json!({
        "channel_id": channel_id,
        "embeds": [{
            "title": "Wither spawn located",
            "description": body,
            "color": color,
            "footer": { "text": server_label },
            "timestamp_ms": estimate.sealed_at_ms,
        }],
    })
}

async fn post_with_retry(
    client: &reqwest::Client,
    webhook_url: &str,
    body: &serde_json::Value,
) -> bool {
    for attempt in 0..SINK_ATTEMPTS {
        match client.post(webhook_url).json(body).send().await {
            Ok(resp) if resp.status().is_success() => return true,
            Ok(resp) => {
                warn!(attempt, status = %resp.status(), "chat post rejected");
            }
            Err(e) => {
                warn!(attempt, error = %e, "chat post failed");
            }
        }
        tokio::time::sleep(retry_backoff(attempt)).await;
    }
    false
}
