//! Configuration file handling.
//!
//! This module handles loading engine configuration from
//! `consilium.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upper bound on a caller-requested deadline.
pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline applied when a request omits `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Whether a total backend failure fires the alert sink.
    #[serde(default = "default_true")]
    pub alert_on_total_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            alert_on_total_failure: true,
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new("consilium.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Resolve the effective deadline for a request.
    ///
    /// Falls back to the configured default when the request omits a
    /// timeout, and clamps the result into `(0, MAX_TIMEOUT_MS]`.
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms.unwrap_or(self.default_timeout_ms);
        let ms = ms.clamp(1, MAX_TIMEOUT_MS);
        Duration::from_millis(ms)
    }
}
