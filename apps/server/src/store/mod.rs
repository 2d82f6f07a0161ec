//! Resilient persistence for room and session state.
//!
//! The store is a flat field-map keyspace over a swappable backend (Redis in
//! production, in-memory for tests and dev). All access goes through
//! [`ResilientStore`], which wraps the backend with a circuit breaker, a
//! stale-read cache, and a bounded retry buffer so a persistence outage
//! degrades the service instead of stopping it.

use std::collections::HashMap;

use thiserror::Error;

pub mod backend;
pub mod breaker;
pub mod codec;
pub mod resilient;

pub use backend::{MemoryBackend, RedisBackend, StoreBackend};
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use resilient::{Loaded, ResilientStore, StoreConfig, StoreHealth};

/// Flat string-to-string field map, the only shape the store persists.
pub type Fields = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,

    #[error("store unavailable: {detail}")]
    Unavailable { detail: String },

    #[error("circuit open, store operation refused")]
    CircuitOpen,

    #[error("stored state corrupt: {detail}")]
    Corrupt { detail: String },
}

impl StoreError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        StoreError::Unavailable {
            detail: detail.into(),
        }
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            detail: detail.into(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::Unavailable {
                detail: err.to_string(),
            }
        }
    }
}
