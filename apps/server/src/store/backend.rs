//! Swappable persistence backends behind one async trait.
//!
//! `RedisBackend` is the production backend; `MemoryBackend` backs tests and
//! single-instance dev runs. Both speak the same flat field-map shape, so the
//! resilient wrapper and the codec never care which one is underneath.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use crate::store::{Fields, StoreError};

#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Write every field of `key`, replacing previous values, with a TTL.
    async fn put(&self, key: &str, fields: &Fields, ttl: Duration) -> Result<(), StoreError>;

    /// Read all fields of `key`. A key that was never written (or expired)
    /// is `None`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Fields>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Cheap liveness check used by half-open probes and health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis hash per key. All codec values are strings, so the hash shape maps
/// 1:1 onto `Fields` with no per-field typing surprises.
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|err| StoreError::unavailable(format!("invalid redis url: {err}")))?;
        let conn = ConnectionManager::new(client).await?;
        info!("[STORE] redis backend connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn put(&self, key: &str, fields: &Fields, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let _: () = conn.hset_multiple(key, &items).await?;
        let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        // Redis reports a missing hash as an empty map.
        Ok(if map.is_empty() { None } else { Some(map) })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: bool = conn.exists("health:probe").await?;
        Ok(())
    }
}

struct MemoryEntry {
    fields: Fields,
    expires_at: Option<Instant>,
}

/// In-memory backend with the same observable semantics as Redis, plus test
/// affordances: a fail switch that makes every call return `Unavailable`, a
/// per-operation delay for exercising in-flight races, and dump/restore so a
/// "backend restart" can be simulated without losing durability.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, MemoryEntry>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    ops: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a backend from a previous `dump`, as a restarted backend
    /// process would from its persistence file.
    pub fn from_dump(dump: HashMap<String, Fields>) -> Self {
        let backend = Self::new();
        {
            let mut data = backend.data.lock();
            for (key, fields) in dump {
                data.insert(
                    key,
                    MemoryEntry {
                        fields,
                        expires_at: None,
                    },
                );
            }
        }
        backend
    }

    /// While failing, every operation returns `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every operation sleeps this long before answering, as a slow backend
    /// would. Keeps an in-flight operation observable from another task.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of operations that reached the backend, including failed ones.
    /// Lets tests assert the circuit breaker really short-circuits.
    pub fn ops(&self) -> u64 {
        self.ops.load(Ordering::SeqCst)
    }

    pub fn dump(&self) -> HashMap<String, Fields> {
        let now = Instant::now();
        self.data
            .lock()
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_none_or(|at| at > now))
            .map(|(key, entry)| (key.clone(), entry.fields.clone()))
            .collect()
    }

    async fn check_available(&self) -> Result<(), StoreError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ops.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("backend offline (simulated)"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn put(&self, key: &str, fields: &Fields, ttl: Duration) -> Result<(), StoreError> {
        self.check_available().await?;
        self.data.lock().insert(
            key.to_string(),
            MemoryEntry {
                fields: fields.clone(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        self.check_available().await?;
        let mut data = self.data.lock();
        let expired = data
            .get(key)
            .is_some_and(|entry| entry.expires_at.is_some_and(|at| at <= Instant::now()));
        if expired {
            data.remove(key);
        }
        Ok(data.get(key).map(|entry| entry.fields.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_available().await?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available().await
    }
}
