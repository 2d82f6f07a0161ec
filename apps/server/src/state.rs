//! Shared application state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::identity::{DevIdentityProvider, IdentityProvider};
use crate::room::RoomManager;
use crate::session::SessionRegistry;
use crate::store::{ResilientStore, StoreBackend};

/// Everything a connection needs, shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<ResilientStore>,
    pub rooms: Arc<RoomManager>,
    pub identity: Arc<dyn IdentityProvider>,
    started_at: Instant,
}

impl AppState {
    /// Wire the full state graph over the given backend.
    pub fn new(config: ServerConfig, backend: Arc<dyn StoreBackend>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new(config.takeover_enabled));
        let store = Arc::new(ResilientStore::new(backend, config.store.clone()));
        let rooms = RoomManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&config),
        );
        Self {
            config,
            registry,
            store,
            rooms,
            identity: Arc::new(DevIdentityProvider::new()),
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
