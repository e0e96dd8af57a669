//! Runtime configuration for route-prefetch.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All prefetch timing knobs (delays, staleness window) live here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "route-prefetch", about = "Route prefetch coordinator sidecar")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides the config file).
    #[arg(long)]
    pub listen: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Prefetch timing.
    pub prefetch: PrefetchConfig,

    /// Simulated origin used by the sidecar's loaders.
    pub origin: OriginConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Allow cross-origin requests (browser pages calling the sidecar).
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            cors_permissive: true,
        }
    }
}

/// Prefetch timing defaults, applied when a call leaves an option unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Delay before a plain `prefetch` issues its fetch (0 = immediate).
    pub default_delay_ms: u64,

    /// Hover-intent threshold used by hover handlers.
    pub hover_delay_ms: u64,

    /// How long a successful prefetch suppresses repeats.
    pub stale_time_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 0,
            hover_delay_ms: 100,
            stale_time_ms: 300_000,
        }
    }
}

impl PrefetchConfig {
    pub fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    pub fn hover_delay(&self) -> Duration {
        Duration::from_millis(self.hover_delay_ms)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }
}

/// Simulated origin settings for the sidecar binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Artificial latency of each load.
    pub latency_ms: u64,

    /// Size of each synthetic payload in bytes.
    pub payload_bytes: usize,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            latency_ms: 50,
            payload_bytes: 1024,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the sidecar cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.listen.trim().is_empty() {
            anyhow::bail!("server.listen must not be empty");
        }
        Ok(())
    }
}
