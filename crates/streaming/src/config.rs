use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the tile channel and the HTTP fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Pending channel requests older than this are rejected and dropped.
    /// `None` keeps them until a response (or channel close) arrives.
    pub request_timeout_ms: Option<u64>,

    /// How often the connection sweeps the pending table for expired requests.
    pub sweep_interval_ms: u64,

    /// Fixed timeout for HTTP fallback fetches.
    pub http_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: None,
            sweep_interval_ms: 1_000,
            http_timeout_ms: 30_000,
        }
    }
}

impl StreamingConfig {
    /// Defaults overridden by `TILES_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_timeout_ms: env_var_u64("TILES_REQUEST_TIMEOUT_MS")
                .or(defaults.request_timeout_ms),
            sweep_interval_ms: env_var_u64("TILES_SWEEP_INTERVAL_MS")
                .unwrap_or(defaults.sweep_interval_ms),
            http_timeout_ms: env_var_u64("TILES_HTTP_TIMEOUT_MS")
                .unwrap_or(defaults.http_timeout_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

fn env_var_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
