//! config.rs — Backend configuration
//!
//! Loaded from a TOML file, with the usual environment escape hatches
//! for deployment (WITHER_DB_PATH, WITHER_WEBHOOK_URL, WITHER_STATUS_PORT).
//! Validation happens once at startup; everything downstream can trust
//! the numbers.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use wither_geom::{EstimatorKind, RegionMode};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub locator: LocatorConfig,
    pub observers: ObserversConfig,
    pub log: LogConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocatorConfig {
    /// Label written into every log row and chat post.
    pub server_label: String,
    /// Expected observer count; a batch seals early once all of the
    /// currently-connected observers have reported.
    pub active_observers: usize,
    /// Coincidence window in milliseconds.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,
    /// Error-radius strategy for live batches.
    #[serde(default = "default_estimator")]
    pub estimator: EstimatorKind,
    /// Orthogonal measurement sigma, read only by `covariance`.
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Must match the game server's setting or every hint is mis-modeled.
    pub view_distance_blocks: u32,
    #[serde(default = "default_region_mode")]
    pub region_mode: RegionMode,
    /// Milliseconds the configured estimator may take before the linear
    /// radius is substituted.
    #[serde(default = "default_estimator_deadline_ms")]
    pub estimator_deadline_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObserversConfig {
    /// One ndjson TCP endpoint per observer source, "host:port".
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// SQLite database path (the log connection string).
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Webhook URL; empty disables the chat sink.
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub out_dir: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            out_dir: "diagnostics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            port: std::env::var("WITHER_STATUS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
        }
    }
}

fn default_batch_window_ms() -> u64 {
    5_000
}
fn default_estimator() -> EstimatorKind {
    EstimatorKind::Linear
}
fn default_sigma() -> f64 {
    0.5
}
fn default_region_mode() -> RegionMode {
    RegionMode::Intersection
}
fn default_estimator_deadline_ms() -> u64 {
    1_000
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {path}"))?;
        let mut cfg: Config = toml::from_str(&raw).context("parsing config")?;

        if let Ok(db) = std::env::var("WITHER_DB_PATH") {
            cfg.log.database_path = db;
        }
        if let Ok(url) = std::env::var("WITHER_WEBHOOK_URL") {
            cfg.chat.webhook_url = url;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.locator.active_observers < 2 {
            bail!("active_observers must be at least 2");
        }
        if self.locator.batch_window_ms == 0 {
            bail!("batch_window_ms must be positive");
        }
        if self.locator.view_distance_blocks < 32 {
            bail!("view_distance_blocks must be at least 32");
        }
        if self.locator.sigma <= 0.0 {
            bail!("sigma must be positive");
        }
        if self.observers.endpoints.len() < self.locator.active_observers {
            bail!(
                "only {} observer endpoints configured for {} active observers",
                self.observers.endpoints.len(),
                self.locator.active_observers
            );
        }
        Ok(())
    }
}
