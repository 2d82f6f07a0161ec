//! Events emitted by engine operations.
//!
//! Each mutation returns the ordered list of state changes it caused. The
//! room coordinator turns these into wire messages; the engine itself never
//! talks to sockets.

use crate::domain::cards::{Card, Suit};
use crate::domain::state::Seat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PlayerJoined {
        seat: Seat,
        username: String,
    },
    PlayerLeft {
        seat: Seat,
        username: String,
    },
    /// All four seats filled; teams are fixed by seat parity and the hakem
    /// is announced.
    TeamsAssigned {
        hakem: Seat,
    },
    /// Five cards dealt to every seat. Hands are read from state, never
    /// carried in the event, so a single event can fan out per-seat.
    InitialDealDealt,
    HokmSelected {
        suit: Suit,
    },
    /// Remaining eight cards dealt to every seat.
    FinalDealDealt,
    TurnStarted {
        seat: Seat,
    },
    CardPlayed {
        seat: Seat,
        card: Card,
    },
    TrickResolved {
        winner: Seat,
        trick_counts: [u8; 2],
    },
    HandCompleted {
        winning_team: u8,
        trick_counts: [u8; 2],
        hand_wins: [u8; 2],
        game_complete: bool,
    },
    /// Room entered quarantine after unrecoverable state corruption.
    GameQuarantined {
        reason: String,
    },
}
