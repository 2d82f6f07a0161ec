//! Game domain: rules, state, and deterministic dealing for four-player Hokm.
//!
//! Everything in here is pure. Side effects (persistence, sockets, timers)
//! belong to the room coordinator and session layers, which call into this
//! module and fan out the returned events.

pub mod cards;
pub mod cards_serde;
pub mod dealing;
pub mod engine;
pub mod errors;
pub mod events;
pub mod state;
pub mod tricks;
pub mod view;

#[cfg(test)]
mod test_prelude;
#[cfg(test)]
mod tests_props_engine;
#[cfg(test)]
mod tests_props_tricks;

pub use cards::{Card, Rank, Suit};
pub use errors::RulesError;
pub use events::GameEvent;
pub use state::{Phase, RoomState, Seat, SeatOccupant};
pub use view::{player_view, PlayerView};
