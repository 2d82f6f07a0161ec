//! Room lifecycle and serialized mutation.
//!
//! Each live room is one tokio task owning its `RoomState`; everything that
//! mutates a room goes through the task's mailbox, so game logic never needs
//! a lock. The manager resolves codes to handles, reviving rooms from the
//! store when they are not resident.

pub mod manager;
pub mod task;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{Card, Suit};

pub use manager::{RoomAccessError, RoomManager};

/// Mailbox capacity per room. Player commands await a full mailbox
/// (backpressure); lossy notifications are dropped instead.
pub const ROOM_MAILBOX: usize = 64;

#[derive(Debug)]
pub enum RoomCommand {
    Join { player_id: Uuid, username: String },
    Reconnect { player_id: Uuid },
    SelectHokm { player_id: Uuid, suit: Suit },
    PlayCard { player_id: Uuid, card: Card },
    Leave { player_id: Uuid },
    /// Connection lost without a leave; starts the grace timer.
    ConnectionDropped { player_id: Uuid },
    /// A grace timer fired for this player.
    GraceExpired { player_id: Uuid },
    /// Heartbeat liveness signal, lossy.
    Touch { player_id: Uuid },
}

#[derive(Debug, Error)]
pub enum RoomSendError {
    #[error("room task has stopped")]
    Closed,
}

/// Cheap clonable sender for one room's mailbox.
#[derive(Clone)]
pub struct RoomHandle {
    room_code: String,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub(crate) fn new(room_code: String, tx: mpsc::Sender<RoomCommand>) -> Self {
        Self { room_code, tx }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// Deliver a player command, waiting out backpressure.
    pub async fn command(&self, cmd: RoomCommand) -> Result<(), RoomSendError> {
        self.tx.send(cmd).await.map_err(|_| RoomSendError::Closed)
    }

    /// Lossy delivery for signals that may be dropped under load.
    pub fn notify(&self, cmd: RoomCommand) {
        let _ = self.tx.try_send(cmd);
    }

    pub(crate) fn sender(&self) -> mpsc::Sender<RoomCommand> {
        self.tx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
