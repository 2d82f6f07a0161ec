//! Balancer configuration.
//!
//! Environment variables must be set by the runtime environment (compose
//! env_file, --env-file, or sourced manually for local dev). INSTANCES is
//! the one required variable; a balancer with no instances to route to is
//! a misconfiguration, not an empty pool.

use std::time::Duration;

use crate::error::AppError;
use crate::pool::InstanceSeed;
use crate::prober::ProbeConfig;

#[derive(Debug, Clone)]
pub struct BalancerConfig {
    pub bind_addr: String,
    /// Static instance pool, `id=http://host:port` pairs from INSTANCES.
    pub instances: Vec<InstanceSeed>,
    pub probe: ProbeConfig,
    /// Affinity entries untouched for this long are swept. Matches the
    /// room state TTL so a revivable room keeps its pin.
    pub affinity_ttl: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            instances: Vec::new(),
            probe: ProbeConfig::default(),
            affinity_ttl: Duration::from_secs(86_400),
        }
    }
}

impl BalancerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let raw_instances = std::env::var("INSTANCES")
            .map_err(|_| AppError::config("INSTANCES must be set (id=http://host:port,...)"))?;

        let probe = ProbeConfig {
            interval: env_secs("PROBE_INTERVAL_SECS", defaults.probe.interval)?,
            timeout: env_millis("PROBE_TIMEOUT_MS", defaults.probe.timeout)?,
            failure_threshold: env_u32(
                "PROBE_FAILURE_THRESHOLD",
                defaults.probe.failure_threshold,
            )?,
            recovery_threshold: env_u32(
                "PROBE_RECOVERY_THRESHOLD",
                defaults.probe.recovery_threshold,
            )?,
        };
        if probe.failure_threshold == 0 || probe.recovery_threshold == 0 {
            return Err(AppError::config("probe thresholds must be at least 1"));
        }

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
            instances: parse_instances(&raw_instances)?,
            probe,
            affinity_ttl: env_secs("AFFINITY_TTL_SECS", defaults.affinity_ttl)?,
        })
    }
}

/// Parse `id=http://host:port` pairs, comma-separated. Ids must be unique;
/// addresses must be absolute http(s) origins. Trailing slashes are trimmed
/// so probe URLs concatenate cleanly.
pub fn parse_instances(raw: &str) -> Result<Vec<InstanceSeed>, AppError> {
    let mut seeds: Vec<InstanceSeed> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, address) = entry.split_once('=').ok_or_else(|| {
            AppError::config(format!("instance entry {entry:?} is not id=address"))
        })?;
        let id = id.trim();
        let address = address.trim().trim_end_matches('/');
        if id.is_empty() {
            return Err(AppError::config(format!(
                "instance entry {entry:?} has an empty id"
            )));
        }
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(AppError::config(format!(
                "instance {id} address {address:?} must be http(s)"
            )));
        }
        if seeds.iter().any(|seed| seed.id == id) {
            return Err(AppError::config(format!("duplicate instance id {id}")));
        }
        seeds.push(InstanceSeed {
            id: id.to_string(),
            address: address.to_string(),
        });
    }
    if seeds.is_empty() {
        return Err(AppError::config("INSTANCES contains no instances"));
    }
    Ok(seeds)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u32(name: &str, default: u32) -> Result<u32, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("{name} must be a number, got {raw:?}"))),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, AppError> {
    Ok(Duration::from_secs(u64::from(env_u32(
        name,
        default.as_secs() as u32,
    )?)))
}

fn env_millis(name: &str, default: Duration) -> Result<Duration, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| AppError::config(format!("{name} must be milliseconds, got {raw:?}"))),
    }
}
