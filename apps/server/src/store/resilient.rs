//! Resilient wrapper around a store backend.
//!
//! Every operation runs under a per-call timeout and the circuit breaker.
//! Writes that cannot reach the backend land in a bounded retry buffer and
//! are replayed after the next successful operation; reads fall back to the
//! last locally cached copy, marked stale. Callers always get a typed error
//! when the backend copy could not be brought up to date, so they can degrade
//! without guessing.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
use crate::store::{Fields, StoreBackend, StoreError};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Per-operation deadline; a slow backend counts as a failed one.
    pub op_timeout: Duration,
    /// Retry buffer capacity. When full, the oldest pending write is dropped.
    pub retry_capacity: usize,
    /// Entries kept for stale reads.
    pub cache_capacity: u64,
    pub breaker: BreakerConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(2),
            retry_capacity: 64,
            cache_capacity: 1024,
            breaker: BreakerConfig::default(),
        }
    }
}

/// A successful read, flagged when it came from the local cache instead of
/// the backend.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub fields: Fields,
    pub stale: bool,
}

/// Store condition as reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub circuit: &'static str,
    pub pending_writes: usize,
    pub degraded: bool,
}

struct PendingWrite {
    key: String,
    fields: Fields,
    ttl: Duration,
}

pub struct ResilientStore {
    backend: Arc<dyn StoreBackend>,
    breaker: CircuitBreaker,
    cache: Cache<String, Fields>,
    retry: Mutex<VecDeque<PendingWrite>>,
    config: StoreConfig,
}

impl ResilientStore {
    pub fn new(backend: Arc<dyn StoreBackend>, config: StoreConfig) -> Self {
        Self {
            backend,
            breaker: CircuitBreaker::new(config.breaker.clone()),
            cache: Cache::builder().max_capacity(config.cache_capacity).build(),
            retry: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Persist `fields` under `key`. The local cache is refreshed no matter
    /// what, so stale reads always see the newest local state; the error
    /// reports only whether the backend copy is current.
    pub async fn save(&self, key: &str, fields: Fields, ttl: Duration) -> Result<(), StoreError> {
        self.cache.insert(key.to_string(), fields.clone()).await;

        if !self.breaker.allow() {
            self.buffer(key, fields, ttl);
            return Err(StoreError::CircuitOpen);
        }
        match self.with_timeout(self.backend.put(key, &fields, ttl)).await {
            Ok(()) => {
                self.breaker.record_success();
                // This write supersedes anything buffered for the key; a
                // drain must not replay an older copy over it.
                self.retry.lock().retain(|w| w.key != key);
                self.drain_pending().await;
                Ok(())
            }
            Err(err) => {
                self.breaker.record_failure();
                self.buffer(key, fields, ttl);
                Err(err)
            }
        }
    }

    /// Read `key`. On backend failure the last cached copy is served with
    /// `stale: true`; with no cached copy the backend error surfaces.
    pub async fn load(&self, key: &str) -> Result<Option<Loaded>, StoreError> {
        if !self.breaker.allow() {
            return self.stale_or(key, StoreError::CircuitOpen).await;
        }
        match self.with_timeout(self.backend.get(key)).await {
            Ok(found) => {
                self.breaker.record_success();
                self.drain_pending().await;
                if let Some(fields) = &found {
                    self.cache.insert(key.to_string(), fields.clone()).await;
                }
                Ok(found.map(|fields| Loaded {
                    fields,
                    stale: false,
                }))
            }
            Err(err) => {
                self.breaker.record_failure();
                self.stale_or(key, err).await
            }
        }
    }

    /// Remove `key`. Pending writes for the key are discarded so a later
    /// drain cannot resurrect it. A failed delete is not retried; the
    /// backend TTL reaps the key eventually.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key).await;
        self.retry.lock().retain(|w| w.key != key);

        if !self.breaker.allow() {
            return Err(StoreError::CircuitOpen);
        }
        match self.with_timeout(self.backend.delete(key)).await {
            Ok(()) => {
                self.breaker.record_success();
                self.drain_pending().await;
                Ok(())
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        if !self.breaker.allow() {
            return Err(StoreError::CircuitOpen);
        }
        match self.with_timeout(self.backend.ping()).await {
            Ok(()) => {
                self.breaker.record_success();
                self.drain_pending().await;
                Ok(())
            }
            Err(err) => {
                self.breaker.record_failure();
                Err(err)
            }
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn pending_writes(&self) -> usize {
        self.retry.lock().len()
    }

    pub fn health(&self) -> StoreHealth {
        let circuit = self.breaker.state();
        let pending_writes = self.pending_writes();
        StoreHealth {
            circuit: circuit.as_str(),
            pending_writes,
            degraded: circuit != CircuitState::Closed || pending_writes > 0,
        }
    }

    async fn with_timeout<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn stale_or(
        &self,
        key: &str,
        err: StoreError,
    ) -> Result<Option<Loaded>, StoreError> {
        match self.cache.get(key).await {
            Some(fields) => {
                warn!(key, error = %err, "[STORE] serving stale cached state");
                Ok(Some(Loaded {
                    fields,
                    stale: true,
                }))
            }
            None => Err(err),
        }
    }

    /// Queue a failed write. One slot per key: a newer write for the same key
    /// replaces the queued one. At capacity the oldest entry is dropped.
    fn buffer(&self, key: &str, fields: Fields, ttl: Duration) {
        let mut retry = self.retry.lock();
        retry.retain(|w| w.key != key);
        retry.push_back(PendingWrite {
            key: key.to_string(),
            fields,
            ttl,
        });
        if retry.len() > self.config.retry_capacity {
            if let Some(dropped) = retry.pop_front() {
                warn!(key = %dropped.key, "[STORE] retry buffer full, dropping oldest write");
            }
        }
        debug!(key, pending = retry.len(), "[STORE] buffered write for retry");
    }

    /// Replay buffered writes while the backend keeps answering. Stops at
    /// the first failure, putting the write back at the front.
    async fn drain_pending(&self) {
        loop {
            let Some(write) = self.retry.lock().pop_front() else {
                return;
            };
            if !self.breaker.allow() {
                self.retry.lock().push_front(write);
                return;
            }
            match self
                .with_timeout(self.backend.put(&write.key, &write.fields, write.ttl))
                .await
            {
                Ok(()) => {
                    self.breaker.record_success();
                    info!(key = %write.key, "[STORE] replayed buffered write");
                }
                Err(err) => {
                    self.breaker.record_failure();
                    warn!(key = %write.key, error = %err, "[STORE] replay failed, keeping buffered");
                    self.retry.lock().push_front(write);
                    return;
                }
            }
        }
    }
}
