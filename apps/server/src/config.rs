//! Server configuration.
//!
//! Environment variables must be set by the runtime environment (compose
//! env_file, --env-file, or sourced manually for local dev). Everything has
//! a sensible default except REDIS_URL, whose absence selects the in-memory
//! backend.

use std::time::Duration;

use crate::error::AppError;
use crate::store::StoreConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Stable identifier reported by /health; the balancer keys instances
    /// by it.
    pub instance_id: String,
    pub redis_url: Option<String>,
    /// Replace an existing live connection instead of rejecting the new one.
    pub takeover_enabled: bool,
    pub heartbeat_interval: Duration,
    /// Missed heartbeats before a connection is considered dead.
    pub heartbeat_miss_limit: u32,
    /// How long a disconnected player's seat is held for reconnection.
    pub grace_period: Duration,
    /// How long a room with no connected players stays resident.
    pub room_vacancy_ttl: Duration,
    pub room_state_ttl: Duration,
    pub session_ttl: Duration,
    pub store: StoreConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            instance_id: "game-1".to_string(),
            redis_url: None,
            takeover_enabled: false,
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_miss_limit: 3,
            grace_period: Duration::from_secs(60),
            room_vacancy_ttl: Duration::from_secs(600),
            room_state_ttl: Duration::from_secs(86_400),
            session_ttl: Duration::from_secs(86_400),
            store: StoreConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let mut config = Self {
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
            instance_id: env_or("INSTANCE_ID", &defaults.instance_id),
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            takeover_enabled: env_bool("TAKEOVER_ENABLED", defaults.takeover_enabled)?,
            heartbeat_interval: env_secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?,
            heartbeat_miss_limit: env_u32("HEARTBEAT_MISS_LIMIT", defaults.heartbeat_miss_limit)?,
            grace_period: env_secs("GRACE_PERIOD_SECS", defaults.grace_period)?,
            room_vacancy_ttl: env_secs("ROOM_VACANCY_TTL_SECS", defaults.room_vacancy_ttl)?,
            room_state_ttl: env_secs("ROOM_STATE_TTL_SECS", defaults.room_state_ttl)?,
            session_ttl: env_secs("SESSION_TTL_SECS", defaults.session_ttl)?,
            store: defaults.store,
        };
        config.store.op_timeout = env_millis("STORE_OP_TIMEOUT_MS", config.store.op_timeout)?;
        if config.heartbeat_miss_limit == 0 {
            return Err(AppError::config("HEARTBEAT_MISS_LIMIT must be at least 1"));
        }
        Ok(config)
    }

    /// Silence window after which a connection is considered dead.
    pub fn client_timeout(&self) -> Duration {
        self.heartbeat_interval * self.heartbeat_miss_limit
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> Result<bool, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => Err(AppError::config(format!("{name} must be a boolean, got {raw:?}"))),
        },
    }
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
