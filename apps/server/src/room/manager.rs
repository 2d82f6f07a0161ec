//! Room residency: code minting, store revival, archival.
//!
//! Any instance can serve any room. A room lives in the store; residency on
//! an instance is just a running task plus a handle in the map. Lookup of a
//! non-resident room revives it from the store, which is the whole failover
//! story: after an instance dies, the next command for one of its rooms
//! lands here and the room comes back.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::domain::{engine, RoomState};
use crate::room::task::RoomTask;
use crate::room::{RoomHandle, ROOM_MAILBOX};
use crate::room_code;
use crate::session::SessionRegistry;
use crate::store::{codec, ResilientStore, StoreError};

/// Completed room codes remembered so late lookups can answer `Completed`
/// instead of `NotFound`.
const ARCHIVE_CAPACITY: usize = 256;

const MINT_ATTEMPTS: usize = 8;

#[derive(Debug, Error)]
pub enum RoomAccessError {
    #[error("room not found")]
    NotFound,
    #[error("game already completed")]
    Completed,
    #[error("store unavailable")]
    Unavailable,
}

pub struct RoomManager {
    rooms: DashMap<String, RoomHandle>,
    archived: Mutex<VecDeque<String>>,
    store: Arc<ResilientStore>,
    registry: Arc<SessionRegistry>,
    config: Arc<ServerConfig>,
}

impl RoomManager {
    pub fn new(
        store: Arc<ResilientStore>,
        registry: Arc<SessionRegistry>,
        config: Arc<ServerConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            archived: Mutex::new(VecDeque::new()),
            store,
            registry,
            config,
        })
    }

    /// Mint a code, spawn a fresh room task, return its handle.
    pub async fn create(self: &Arc<Self>) -> Result<RoomHandle, RoomAccessError> {
        let code = self.mint_code().await?;
        let seed = rand::rng().random::<u64>();
        let state = RoomState::new(code, seed);
        info!(room_code = %state.room_code, "[ROOM] created");
        Ok(self.adopt(state))
    }

    /// Resolve a canonical room code to a live handle, reviving the room
    /// from the store if it is not resident on this instance. Never creates.
    pub async fn lookup(self: &Arc<Self>, code: &str) -> Result<RoomHandle, RoomAccessError> {
        if let Some(handle) = self.resident(code) {
            return Ok(handle);
        }
        match self.load_state(code).await? {
            Some(state) => {
                info!(room_code = %code, "[ROOM] revived from store");
                Ok(self.adopt(state))
            }
            None if self.is_archived(code) => Err(RoomAccessError::Completed),
            None => Err(RoomAccessError::NotFound),
        }
    }

    /// Rooms resident on this instance with a live task.
    pub fn active_rooms(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    /// Whether this instance currently runs the room's task. Rooms parked
    /// in the store do not count; the balancer uses this to pin affinity to
    /// the instance that actually holds the live room.
    pub fn is_resident(&self, code: &str) -> bool {
        self.rooms
            .get(code)
            .is_some_and(|entry| !entry.value().is_closed())
    }

    /// Called by a room task when its game completes. The store key is gone
    /// by then; remembering the code upgrades later lookups from `NotFound`
    /// to `Completed`.
    pub(crate) fn archive(&self, code: &str) {
        self.rooms.remove(code);
        let mut archived = self.archived.lock();
        archived.push_back(code.to_string());
        if archived.len() > ARCHIVE_CAPACITY {
            archived.pop_front();
        }
    }

    /// Called by a room task exiting without completing (vacancy expiry).
    /// State stays in the store; a later lookup revives it.
    pub(crate) fn remove_resident(&self, code: &str) {
        self.rooms.remove(code);
    }

    pub fn is_archived(&self, code: &str) -> bool {
        self.archived.lock().iter().any(|archived| archived == code)
    }

    fn resident(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.remove_if(code, |_, handle| handle.is_closed());
        self.rooms.get(code).map(|entry| entry.value().clone())
    }

    async fn mint_code(&self) -> Result<String, RoomAccessError> {
        for _ in 0..MINT_ATTEMPTS {
            let code = room_code::generate();
            if self.rooms.contains_key(&code) {
                continue;
            }
            // Another instance may already own this code.
            match self.store.load(&codec::room_key(&code)).await {
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(code),
                Err(err) => {
                    warn!(
                        error = %err,
                        "[ROOM] store unreachable while minting, accepting local uniqueness"
                    );
                    return Ok(code);
                }
            }
        }
        warn!("[ROOM] exhausted mint attempts");
        Err(RoomAccessError::Unavailable)
    }

    async fn load_state(&self, code: &str) -> Result<Option<RoomState>, RoomAccessError> {
        let key = codec::room_key(code);
        let loaded = match self.store.load(&key).await {
            Ok(None) => return Ok(None),
            Ok(Some(loaded)) => loaded,
            Err(err) => {
                warn!(room_code = %code, error = %err, "[ROOM] store load failed");
                return Err(RoomAccessError::Unavailable);
            }
        };
        if loaded.stale {
            warn!(room_code = %code, "[ROOM] resuming from stale cached state");
        }
        match codec::room_from_fields(code, &loaded.fields) {
            Ok(state) => Ok(Some(state)),
            Err(StoreError::Corrupt { detail }) => {
                warn!(
                    room_code = %code,
                    detail = %detail,
                    "[ROOM] stored state corrupt, quarantining room"
                );
                let mut state = RoomState::new(code.to_string(), rand::rng().random::<u64>());
                let _ = engine::quarantine(&mut state, &detail);
                let fields = codec::room_to_fields(&state);
                if let Err(err) = self
                    .store
                    .save(&key, fields, self.config.room_state_ttl)
                    .await
                {
                    warn!(
                        room_code = %code,
                        error = %err,
                        "[ROOM] failed to persist quarantine marker"
                    );
                }
                Ok(Some(state))
            }
            Err(err) => {
                warn!(room_code = %code, error = %err, "[ROOM] store decode failed");
                Err(RoomAccessError::Unavailable)
            }
        }
    }

    /// Install a handle and spawn the task, unless a live task for this code
    /// won the race first.
    fn adopt(self: &Arc<Self>, state: RoomState) -> RoomHandle {
        let code = state.room_code.clone();
        let (tx, rx) = mpsc::channel(ROOM_MAILBOX);
        let handle = RoomHandle::new(code.clone(), tx);
        match self.rooms.entry(code) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_closed() {
                    occupied.insert(handle.clone());
                } else {
                    return occupied.get().clone();
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(handle.clone());
            }
        }
        let task = RoomTask::new(
            state,
            rx,
            handle.clone(),
            Arc::clone(self),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
        );
        tokio::spawn(task.run());
        handle
    }
}
