//! Player view of room state - what information is visible to one seat.
//!
//! Views are the only game-state payload that ever leaves the server, so they
//! are built per seat and never include another player's hand or the undealt
//! deck. Reconnection replies and mid-game seat handovers are both served
//! from here.

use serde::{Deserialize, Serialize};

use crate::domain::cards::{Card, Suit};
use crate::domain::state::{Phase, RoomState, Seat, TEAMS};
use crate::domain::tricks;

/// Public info about one occupied seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupantView {
    pub seat: Seat,
    pub username: String,
}

/// One play already on the table this trick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrickPlayView {
    pub seat: Seat,
    pub card: Card,
}

/// Everything one player may know about the room, sufficient to rebuild a
/// client UI from scratch after a reconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub room_code: String,
    pub seat: Seat,
    pub phase: Phase,
    pub hand: Vec<Card>,
    pub hokm: Option<Suit>,
    pub hakem: Option<Seat>,
    pub current_turn: Option<Seat>,
    pub your_turn: bool,
    pub teams: [[Seat; 2]; 2],
    pub trick: Vec<TrickPlayView>,
    pub led_suit: Option<Suit>,
    pub trick_counts: [u8; 2],
    pub hand_wins: [u8; 2],
    pub occupants: Vec<OccupantView>,
}

impl PlayerView {
    /// Cards this player may legally play right now. Empty unless it is
    /// their turn during gameplay.
    pub fn legal_plays(&self) -> Vec<Card> {
        if self.phase != Phase::Gameplay || !self.your_turn {
            return Vec::new();
        }
        tricks::legal_moves(&self.hand, self.led_suit)
    }
}

/// Build the view of `state` as seen from `seat`.
pub fn player_view(state: &RoomState, seat: Seat) -> PlayerView {
    let occupants = state
        .slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            slot.as_ref().map(|occupant| OccupantView {
                seat: i as Seat,
                username: occupant.username.clone(),
            })
        })
        .collect();

    PlayerView {
        room_code: state.room_code.clone(),
        seat,
        phase: state.phase,
        hand: state.hands[seat as usize].clone(),
        hokm: state.hokm,
        hakem: state.hakem,
        current_turn: state.turn,
        your_turn: state.turn == Some(seat),
        teams: TEAMS,
        trick: state
            .trick
            .plays
            .iter()
            .map(|(s, c)| TrickPlayView { seat: *s, card: *c })
            .collect(),
        led_suit: state.trick.led,
        trick_counts: state.trick_counts,
        hand_wins: state.hand_wins,
        occupants,
    }
}
