//! WebSocket wire protocol.
//!
//! Every frame is a JSON object tagged by `type`. Client messages are the
//! five player actions; server messages cover acks, per-seat deals and turn
//! prompts, table broadcasts, and errors. Deals and turn prompts are
//! personalized per seat; everything else is the same payload for the whole
//! table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::RulesError;
use crate::domain::view::PlayerView;
use crate::domain::{Card, Seat, Suit};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Join a room, creating it if needed. Without a room_code the server
    /// mints one.
    Join {
        #[serde(default)]
        room_code: Option<String>,
    },
    /// Resume a seat after a disconnect. The player_id from `welcome` is the
    /// only credential.
    Reconnect { player_id: Uuid },
    SelectHokm { suit: Suit },
    PlayCard { card: Card },
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First frame on every connection. Clients persist player_id for
    /// reconnection.
    Welcome { player_id: Uuid, username: String },
    RoomJoined {
        room_code: String,
        seat: Seat,
        game_state: PlayerView,
    },
    RoomLeft,
    PlayerJoined { seat: Seat, username: String },
    PlayerLeft { seat: Seat, username: String },
    PlayerDisconnected { seat: Seat },
    PlayerReconnected { seat: Seat },
    TeamAssignment {
        teams: [[Seat; 2]; 2],
        hakem: Seat,
    },
    InitialDeal { hand: Vec<Card> },
    HokmSelected { suit: Suit },
    FinalDeal { hand: Vec<Card> },
    TurnStart {
        current_player: Seat,
        your_turn: bool,
    },
    CardPlayed { player: Seat, card: Card },
    TrickResult {
        winner: Seat,
        tricks: [u8; 2],
    },
    HandComplete {
        winning_team: u8,
        tricks: [u8; 2],
        round_scores: [u8; 2],
        game_complete: bool,
    },
    ReconnectSuccess { game_state: PlayerView },
    Error { code: ErrorCode, message: String },
}

impl ServerMsg {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code,
            message: message.into(),
        }
    }

    pub fn rules_error(err: &RulesError) -> Self {
        ServerMsg::Error {
            code: ErrorCode::from(err),
            message: err.to_string(),
        }
    }
}

/// Machine-readable error codes carried in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    InvalidPhase,
    NotYourTurn,
    CardNotInHand,
    SuitFollowViolation,
    InvalidSuitSelection,
    RoomFull,
    NotInRoom,
    RoomNotFound,
    SessionNotFound,
    GraceExpired,
    AlreadyConnected,
    IdentityMismatch,
    RoomQuarantined,
    ServiceUnavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::InvalidPhase => "invalid_phase",
            ErrorCode::NotYourTurn => "not_your_turn",
            ErrorCode::CardNotInHand => "card_not_in_hand",
            ErrorCode::SuitFollowViolation => "suit_follow_violation",
            ErrorCode::InvalidSuitSelection => "invalid_suit_selection",
            ErrorCode::RoomFull => "room_full",
            ErrorCode::NotInRoom => "not_in_room",
            ErrorCode::RoomNotFound => "room_not_found",
            ErrorCode::SessionNotFound => "session_not_found",
            ErrorCode::GraceExpired => "grace_expired",
            ErrorCode::AlreadyConnected => "already_connected",
            ErrorCode::IdentityMismatch => "identity_mismatch",
            ErrorCode::RoomQuarantined => "room_quarantined",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RulesError> for ErrorCode {
    fn from(err: &RulesError) -> Self {
        match err {
            RulesError::InvalidPhase { .. } => ErrorCode::InvalidPhase,
            RulesError::NotYourTurn => ErrorCode::NotYourTurn,
            RulesError::CardNotInHand => ErrorCode::CardNotInHand,
            RulesError::SuitFollowViolation => ErrorCode::SuitFollowViolation,
            RulesError::InvalidSuitSelection { .. } => ErrorCode::InvalidSuitSelection,
            RulesError::RoomFull => ErrorCode::RoomFull,
            RulesError::SeatNotInRoom => ErrorCode::NotInRoom,
            RulesError::ParseCard { .. } => ErrorCode::BadRequest,
        }
    }
}
