//! Room state: the single source of truth for one Hokm table.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::cards::{Card, Suit};

/// Seat index, 0..=3. Seats 0 and 2 form team 0, seats 1 and 3 form team 1.
pub type Seat = u8;

pub const SEATS: usize = 4;

/// Tricks a team must take to win a hand.
pub const TRICKS_TO_WIN_HAND: u8 = 7;

/// Hands a team must win to win the game.
pub const HANDS_TO_WIN_GAME: u8 = 7;

/// Fixed team partition by seat parity.
pub const TEAMS: [[Seat; 2]; 2] = [[0, 2], [1, 3]];

pub fn next_seat(seat: Seat) -> Seat {
    (seat + 1) % SEATS as Seat
}

pub fn team_of(seat: Seat) -> usize {
    (seat % 2) as usize
}

/// Game lifecycle phase. TEAM_ASSIGNMENT and FINAL_DEAL are pass-through
/// phases with no player input; the engine moves straight through them but
/// still announces them via events.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    WaitingForPlayers,
    TeamAssignment,
    HokmSelection,
    FinalDeal,
    Gameplay,
    HandComplete,
    GameOver,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::WaitingForPlayers => "WAITING_FOR_PLAYERS",
            Phase::TeamAssignment => "TEAM_ASSIGNMENT",
            Phase::HokmSelection => "HOKM_SELECTION",
            Phase::FinalDeal => "FINAL_DEAL",
            Phase::Gameplay => "GAMEPLAY",
            Phase::HandComplete => "HAND_COMPLETE",
            Phase::GameOver => "GAME_OVER",
        }
    }

    /// Parse the stored representation. Returns None for unknown strings so
    /// the store codec can surface corruption instead of guessing.
    pub fn from_stored(s: &str) -> Option<Phase> {
        match s {
            "WAITING_FOR_PLAYERS" => Some(Phase::WaitingForPlayers),
            "TEAM_ASSIGNMENT" => Some(Phase::TeamAssignment),
            "HOKM_SELECTION" => Some(Phase::HokmSelection),
            "FINAL_DEAL" => Some(Phase::FinalDeal),
            "GAMEPLAY" => Some(Phase::Gameplay),
            "HAND_COMPLETE" => Some(Phase::HandComplete),
            "GAME_OVER" => Some(Phase::GameOver),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A player holding a seat. The player_id is the durable identity used for
/// reconnection; the seat survives disconnects until grace expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatOccupant {
    pub player_id: Uuid,
    pub username: String,
}

/// The trick currently on the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trick {
    /// Plays in order, at most four.
    pub plays: Vec<(Seat, Card)>,
    /// Suit of the first card played this trick.
    pub led: Option<Suit>,
}

impl Trick {
    pub fn clear(&mut self) {
        self.plays.clear();
        self.led = None;
    }

    pub fn is_complete(&self) -> bool {
        self.plays.len() == SEATS
    }
}

/// Complete state of one room. Everything here is persisted; transient
/// concerns (connections, timers) live outside the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    pub room_code: String,
    pub slots: [Option<SeatOccupant>; SEATS],
    pub phase: Phase,
    /// Undealt remainder of the deck between the initial and final deals.
    pub deck: Vec<Card>,
    pub hands: [Vec<Card>; SEATS],
    pub hokm: Option<Suit>,
    pub hakem: Option<Seat>,
    pub trick: Trick,
    pub turn: Option<Seat>,
    /// Tricks taken by each team in the current hand.
    pub trick_counts: [u8; 2],
    /// Hands won by each team across the game.
    pub hand_wins: [u8; 2],
    /// Seed for deterministic dealing. Persisted so a failover instance
    /// reconstructs the exact same shuffle.
    pub deal_seed: u64,
    /// Set when the room was quarantined after unrecoverable corruption.
    pub fault: Option<String>,
}

impl RoomState {
    pub fn new(room_code: String, deal_seed: u64) -> Self {
        Self {
            room_code,
            slots: Default::default(),
            phase: Phase::WaitingForPlayers,
            deck: Vec::new(),
            hands: Default::default(),
            hokm: None,
            hakem: None,
            trick: Trick::default(),
            turn: None,
            trick_counts: [0, 0],
            hand_wins: [0, 0],
            deal_seed,
            fault: None,
        }
    }

    pub fn seat_of(&self, player_id: Uuid) -> Option<Seat> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|occupant| occupant.player_id == player_id)
        }).map(|i| i as Seat)
    }

    pub fn occupant(&self, seat: Seat) -> Option<&SeatOccupant> {
        self.slots.get(seat as usize).and_then(|s| s.as_ref())
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn first_vacant(&self) -> Option<Seat> {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .map(|i| i as Seat)
    }

    pub fn is_full(&self) -> bool {
        self.occupied_count() == SEATS
    }

    /// Zero-based index of the hand currently being played, derived from
    /// completed hands. Feeds per-hand seed derivation.
    pub fn hand_index(&self) -> u32 {
        u32::from(self.hand_wins[0]) + u32::from(self.hand_wins[1])
    }
}
