//! Rule violations returned by engine operations.
//!
//! Engine ops never panic on bad input. Every violation comes back as a
//! `RulesError` so callers can report it to the offending player without
//! touching room state.

use thiserror::Error;

use crate::domain::state::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("operation not valid in phase {actual}")]
    InvalidPhase { actual: Phase },

    #[error("not your turn")]
    NotYourTurn,

    #[error("card not in hand")]
    CardNotInHand,

    #[error("must follow the led suit")]
    SuitFollowViolation,

    #[error("invalid hokm selection: {detail}")]
    InvalidSuitSelection { detail: String },

    #[error("room is full")]
    RoomFull,

    #[error("player has no seat in this room")]
    SeatNotInRoom,

    #[error("malformed card token: {token}")]
    ParseCard { token: String },
}

impl RulesError {
    /// Stable machine-readable code, used in wire error payloads and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RulesError::InvalidPhase { .. } => "invalid_phase",
            RulesError::NotYourTurn => "not_your_turn",
            RulesError::CardNotInHand => "card_not_in_hand",
            RulesError::SuitFollowViolation => "suit_follow_violation",
            RulesError::InvalidSuitSelection { .. } => "invalid_suit_selection",
            RulesError::RoomFull => "room_full",
            RulesError::SeatNotInRoom => "not_in_room",
            RulesError::ParseCard { .. } => "bad_request",
        }
    }
}
