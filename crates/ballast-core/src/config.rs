//! ballast.toml configuration parser.
//!
//! Configuration layers, later layers winning: built-in defaults, the toml
//! file, environment variables (`BALLAST_LOAD_BALANCER`,
//! `BALLAST_LISTENERS` as a comma-separated list), then whatever CLI flags
//! the binary applies on top. `validate()` runs after all layers and
//! before any control plane call.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{BallastError, BallastResult};

/// Environment variable naming the load balancer to rebalance.
pub const ENV_LOAD_BALANCER: &str = "BALLAST_LOAD_BALANCER";
/// Environment variable carrying the comma-separated listener list.
pub const ENV_LISTENERS: &str = "BALLAST_LISTENERS";

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_CONCURRENT_LOOKUPS: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BallastConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub plane: PlaneConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
}

/// What to rebalance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Load balancer identifier.
    #[serde(default)]
    pub load_balancer: String,
    /// Listeners whose forwarding weights get reconciled.
    #[serde(default)]
    pub listeners: Vec<String>,
}

/// Control plane client settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaneConfig {
    /// Region override; the provider's default chain applies otherwise.
    pub region: Option<String>,
    /// Deadline per external call (e.g. "30s").
    pub operation_timeout: Option<String>,
    /// Bounded retries for transient control plane failures.
    pub max_retries: Option<u32>,
}

/// Rebalance loop settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Period between passes in daemon mode (e.g. "60s").
    pub interval: Option<String>,
    /// Upper bound on concurrent capacity lookups.
    pub max_concurrent_lookups: Option<usize>,
    /// Plan updates without writing them.
    pub dry_run: Option<bool>,
}

impl BallastConfig {
    pub fn from_file(path: &Path) -> BallastResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BallastError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: BallastConfig = toml::from_str(&content).map_err(|e| {
            BallastError::Configuration(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Load configuration: the given file if any, otherwise `ballast.toml`
    /// in the working directory if present, otherwise defaults. Environment
    /// fallbacks are applied afterwards.
    pub fn load(path: Option<&Path>) -> BallastResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new("ballast.toml");
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.env_fallback(|key| std::env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    /// Fill unset target fields from the environment. The listener list is
    /// comma-separated with per-item whitespace trimming.
    fn env_fallback(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.target.load_balancer.trim().is_empty() {
            if let Some(lb) = lookup(ENV_LOAD_BALANCER) {
                self.target.load_balancer = lb;
            }
        }
        if self.target.listeners.is_empty() {
            if let Some(raw) = lookup(ENV_LISTENERS) {
                self.target.listeners = split_listeners(&raw);
            }
        }
    }

    /// Trim identifiers and drop empty entries.
    pub fn normalize(&mut self) {
        self.target.load_balancer = self.target.load_balancer.trim().to_string();
        self.target.listeners = self
            .target
            .listeners
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
    }

    /// Check the configuration before any control plane call.
    pub fn validate(&self) -> BallastResult<()> {
        if self.target.load_balancer.trim().is_empty() {
            return Err(BallastError::Configuration(
                "no load balancer configured (set [target].load_balancer, \
                 BALLAST_LOAD_BALANCER, or --load-balancer)"
                    .to_string(),
            ));
        }
        if self.target.listeners.is_empty() {
            return Err(BallastError::Configuration(
                "no listeners configured (set [target].listeners, \
                 BALLAST_LISTENERS, or --listener)"
                    .to_string(),
            ));
        }
        for (key, value) in [
            ("plane.operation_timeout", &self.plane.operation_timeout),
            ("rebalance.interval", &self.rebalance.interval),
        ] {
            if let Some(raw) = value {
                if parse_duration(raw).is_none() {
                    return Err(BallastError::Configuration(format!(
                        "invalid duration for {key}: {raw:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        self.plane
            .operation_timeout
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn max_retries(&self) -> u32 {
        self.plane.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn interval(&self) -> Duration {
        self.rebalance
            .interval
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_INTERVAL)
    }

    /// At least 1; 1 means sequential capacity resolution.
    pub fn max_concurrent_lookups(&self) -> usize {
        self.rebalance
            .max_concurrent_lookups
            .unwrap_or(DEFAULT_MAX_CONCURRENT_LOOKUPS)
            .max(1)
    }

    pub fn dry_run(&self) -> bool {
        self.rebalance.dry_run.unwrap_or(false)
    }
}

/// Split a comma-separated listener list, trimming each item.
pub fn split_listeners(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// Parse a duration string like "5s", "500ms", "1m".
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
