//! Connection-scoped session registry.
//!
//! One entry per known player on this instance: their live connection (if
//! any), current room binding, and heartbeat freshness. The registry owns
//! the single-session rule: a second connection for the same player is
//! rejected, or takes over the old one when takeover is enabled. Seat
//! bindings released by grace expiry leave a tombstone so a late reconnect
//! can be answered precisely instead of with a generic not-found.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use actix::prelude::*;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::PlayerIdentity;
use crate::session::protocol::ServerMsg;
use crate::store::{Fields, StoreError};

/// Expired seat bindings remembered for late reconnect answers.
const TOMBSTONE_CAPACITY: usize = 1024;

/// Server-to-client frame delivered through the session actor.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct SessionPush(pub ServerMsg);

/// Ask a session actor to close its connection. Sent to the old actor when
/// a takeover replaces it.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Connected => "connected",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Reconnecting => "reconnecting",
        }
    }

    pub fn from_stored(s: &str) -> Option<SessionStatus> {
        match s {
            "connected" => Some(SessionStatus::Connected),
            "disconnected" => Some(SessionStatus::Disconnected),
            "reconnecting" => Some(SessionStatus::Reconnecting),
            _ => None,
        }
    }
}

/// Live connection endpoints for one session actor.
#[derive(Clone)]
pub struct ConnHandle {
    pub conn_id: Uuid,
    pub push: Recipient<SessionPush>,
    pub control: Recipient<Shutdown>,
}

struct SessionEntry {
    username: String,
    room_code: Option<String>,
    status: SessionStatus,
    last_heartbeat: OffsetDateTime,
    conn: Option<ConnHandle>,
}

/// Point-in-time copy of a session entry, also the shape persisted to the
/// store under `session:{player_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub username: String,
    pub room_code: Option<String>,
    pub status: SessionStatus,
    pub last_heartbeat: OffsetDateTime,
}

impl SessionRecord {
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("username".into(), self.username.clone());
        fields.insert(
            "room_code".into(),
            self.room_code.clone().unwrap_or_default(),
        );
        fields.insert("status".into(), self.status.as_str().into());
        fields.insert(
            "last_heartbeat".into(),
            self.last_heartbeat.unix_timestamp().to_string(),
        );
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, StoreError> {
        let get = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| StoreError::corrupt(format!("session missing field {name}")))
        };
        let status_raw = get("status")?;
        let status = SessionStatus::from_stored(status_raw)
            .ok_or_else(|| StoreError::corrupt(format!("session status {status_raw:?}")))?;
        let ts: i64 = get("last_heartbeat")?
            .parse()
            .map_err(|_| StoreError::corrupt("session last_heartbeat not a timestamp"))?;
        let last_heartbeat = OffsetDateTime::from_unix_timestamp(ts)
            .map_err(|_| StoreError::corrupt("session last_heartbeat out of range"))?;
        let room_code = match get("room_code")?.as_str() {
            "" => None,
            code => Some(code.to_string()),
        };
        Ok(Self {
            username: get("username")?.clone(),
            room_code,
            status,
            last_heartbeat,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("player already has a live connection")]
    AlreadyConnected,
}

struct ExpiredBinding {
    player_id: Uuid,
    room_code: String,
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
    tombstones: Mutex<VecDeque<ExpiredBinding>>,
    /// Entries with a live connection; feeds the health endpoint.
    connected: AtomicUsize,
    takeover_enabled: bool,
}

impl SessionRegistry {
    pub fn new(takeover_enabled: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            tombstones: Mutex::new(VecDeque::new()),
            connected: AtomicUsize::new(0),
            takeover_enabled,
        }
    }

    /// Attach a live connection to the player's session, creating the entry
    /// on first sight. Returns the player's current room binding so the
    /// caller can resume it.
    ///
    /// A player with a connection already attached is rejected unless
    /// takeover is enabled, in which case the old connection is told to shut
    /// down and the new one wins.
    pub fn connect(
        &self,
        identity: &PlayerIdentity,
        conn: ConnHandle,
    ) -> Result<Option<String>, ConnectError> {
        let mut entry = self
            .sessions
            .entry(identity.player_id)
            .or_insert_with(|| SessionEntry {
                username: identity.username.clone(),
                room_code: None,
                status: SessionStatus::Disconnected,
                last_heartbeat: OffsetDateTime::now_utc(),
                conn: None,
            });

        if let Some(existing) = &entry.conn {
            if !self.takeover_enabled {
                warn!(
                    player_id = %identity.player_id,
                    "[SESSION] duplicate connection rejected"
                );
                return Err(ConnectError::AlreadyConnected);
            }
            info!(
                player_id = %identity.player_id,
                old_conn = %existing.conn_id,
                new_conn = %conn.conn_id,
                "[SESSION] takeover, shutting down previous connection"
            );
            let _ = existing.control.do_send(Shutdown);
        } else {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        entry.username = identity.username.clone();
        entry.status = SessionStatus::Connected;
        entry.last_heartbeat = OffsetDateTime::now_utc();
        entry.conn = Some(conn);
        Ok(entry.room_code.clone())
    }

    /// Detach a connection when its actor stops. Guarded by conn_id: after a
    /// takeover, the replaced actor's late stop must not mark the session
    /// (now owned by the new connection) as disconnected. Returns whether
    /// the session actually transitioned.
    pub fn mark_disconnected(&self, player_id: Uuid, conn_id: Uuid) -> bool {
        let Some(mut entry) = self.sessions.get_mut(&player_id) else {
            return false;
        };
        if !entry
            .conn
            .as_ref()
            .is_some_and(|conn| conn.conn_id == conn_id)
        {
            return false;
        }
        entry.conn = None;
        entry.status = SessionStatus::Disconnected;
        self.connected.fetch_sub(1, Ordering::SeqCst);
        true
    }

    pub fn touch(&self, player_id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(&player_id) {
            entry.last_heartbeat = OffsetDateTime::now_utc();
        }
    }

    pub fn set_status(&self, player_id: Uuid, status: SessionStatus) {
        if let Some(mut entry) = self.sessions.get_mut(&player_id) {
            entry.status = status;
        }
    }

    pub fn bind_room(&self, player_id: Uuid, room_code: &str) {
        if let Some(mut entry) = self.sessions.get_mut(&player_id) {
            entry.room_code = Some(room_code.to_string());
        }
    }

    pub fn unbind_room(&self, player_id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(&player_id) {
            entry.room_code = None;
        }
    }

    pub fn room_of(&self, player_id: Uuid) -> Option<String> {
        self.sessions
            .get(&player_id)
            .and_then(|entry| entry.room_code.clone())
    }

    pub fn snapshot(&self, player_id: Uuid) -> Option<SessionRecord> {
        self.sessions.get(&player_id).map(|entry| SessionRecord {
            username: entry.username.clone(),
            room_code: entry.room_code.clone(),
            status: entry.status,
            last_heartbeat: entry.last_heartbeat,
        })
    }

    /// Deliver a frame to the player's live connection, if any.
    pub fn push_to(&self, player_id: Uuid, msg: ServerMsg) -> bool {
        if let Some(entry) = self.sessions.get(&player_id) {
            if let Some(conn) = &entry.conn {
                let _ = conn.push.do_send(SessionPush(msg));
                return true;
            }
        }
        false
    }

    /// Release the player's room binding after grace expiry and remember it
    /// as a tombstone. Returns the released room code.
    pub fn expire_binding(&self, player_id: Uuid) -> Option<String> {
        let room_code = {
            let mut entry = self.sessions.get_mut(&player_id)?;
            entry.room_code.take()?
        };
        let mut tombstones = self.tombstones.lock();
        tombstones.push_back(ExpiredBinding {
            player_id,
            room_code: room_code.clone(),
        });
        if tombstones.len() > TOMBSTONE_CAPACITY {
            tombstones.pop_front();
        }
        Some(room_code)
    }

    /// Room code of a binding this instance expired for the player, if still
    /// remembered. Distinguishes "your seat timed out" from "never heard of
    /// you".
    pub fn tombstoned_room(&self, player_id: Uuid) -> Option<String> {
        self.tombstones
            .lock()
            .iter()
            .rev()
            .find(|t| t.player_id == player_id)
            .map(|t| t.room_code.clone())
    }

    pub fn active_connections(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}
