//! Pure engine operations over RoomState.
//!
//! Every operation validates first, mutates second, and reports what changed
//! as an ordered list of events. No I/O, no clocks, no randomness beyond the
//! seed already carried in the state, so the same inputs always produce the
//! same room regardless of which instance runs them.

use uuid::Uuid;

use crate::domain::cards::{Card, Suit};
use crate::domain::dealing;
use crate::domain::errors::RulesError;
use crate::domain::events::GameEvent;
use crate::domain::state::{
    next_seat, team_of, Phase, RoomState, Seat, SeatOccupant, HANDS_TO_WIN_GAME,
    TRICKS_TO_WIN_HAND,
};
use crate::domain::tricks;

/// Seat a player in the lowest vacant slot. Seating the fourth player starts
/// the game: teams are announced, the first hand is dealt, and the hakem is
/// prompted for hokm. Joining an in-progress room fills a vacated seat and
/// inherits its hand.
///
/// Re-joining with a player_id that already holds a seat is a no-op; the
/// caller answers with the existing seat.
pub fn join(
    state: &mut RoomState,
    player_id: Uuid,
    username: &str,
) -> Result<Vec<GameEvent>, RulesError> {
    if state.phase == Phase::GameOver {
        return Err(RulesError::InvalidPhase {
            actual: state.phase,
        });
    }
    if state.seat_of(player_id).is_some() {
        return Ok(Vec::new());
    }
    let Some(seat) = state.first_vacant() else {
        return Err(RulesError::RoomFull);
    };

    state.slots[seat as usize] = Some(SeatOccupant {
        player_id,
        username: username.to_string(),
    });
    let mut events = vec![GameEvent::PlayerJoined {
        seat,
        username: username.to_string(),
    }];

    if state.phase == Phase::WaitingForPlayers && state.is_full() {
        start_game(state, &mut events);
    }
    Ok(events)
}

/// The hakem names hokm. This closes HOKM_SELECTION, deals the remaining
/// eight cards to every seat, and opens play with the hakem leading.
pub fn select_hokm(
    state: &mut RoomState,
    seat: Seat,
    suit: Suit,
) -> Result<Vec<GameEvent>, RulesError> {
    if state.phase != Phase::HokmSelection {
        return Err(RulesError::InvalidPhase {
            actual: state.phase,
        });
    }
    if state.hakem != Some(seat) {
        return Err(RulesError::NotYourTurn);
    }

    state.hokm = Some(suit);
    let mut events = vec![GameEvent::HokmSelected { suit }];

    state.phase = Phase::FinalDeal;
    dealing::deal_round(&mut state.deck, &mut state.hands, seat, dealing::FINAL_DEAL);
    events.push(GameEvent::FinalDealDealt);

    state.phase = Phase::Gameplay;
    state.turn = Some(seat);
    events.push(GameEvent::TurnStarted { seat });
    Ok(events)
}

/// Play a card into the current trick, enforcing phase, turn order,
/// possession, and suit-following. Completing a trick resolves it; the
/// seventh trick for a team completes the hand, and the seventh hand win
/// completes the game.
pub fn play_card(
    state: &mut RoomState,
    seat: Seat,
    card: Card,
) -> Result<Vec<GameEvent>, RulesError> {
    if state.phase != Phase::Gameplay {
        return Err(RulesError::InvalidPhase {
            actual: state.phase,
        });
    }
    let Some(turn) = state.turn else {
        return Err(RulesError::NotYourTurn);
    };
    if turn != seat {
        return Err(RulesError::NotYourTurn);
    }
    let Some(hokm) = state.hokm else {
        // Gameplay with no hokm set means the state never went through
        // selection; refuse rather than guess.
        return Err(RulesError::InvalidPhase {
            actual: state.phase,
        });
    };

    // Immutable checks before any mutation.
    let hand = &state.hands[seat as usize];
    let Some(pos) = hand.iter().position(|&c| c == card) else {
        return Err(RulesError::CardNotInHand);
    };
    if let Some(led) = state.trick.led {
        if card.suit != led && tricks::hand_has_suit(hand, led) {
            return Err(RulesError::SuitFollowViolation);
        }
    }

    // First play of the trick fixes the led suit.
    if state.trick.plays.is_empty() {
        state.trick.led = Some(card.suit);
    }
    let played = state.hands[seat as usize].remove(pos);
    state.trick.plays.push((seat, played));

    let mut events = vec![GameEvent::CardPlayed { seat, card: played }];

    if !state.trick.is_complete() {
        let next = next_seat(seat);
        state.turn = Some(next);
        events.push(GameEvent::TurnStarted { seat: next });
        return Ok(events);
    }

    let led = state.trick.led.unwrap_or(played.suit);
    let Some(winner) = tricks::trick_winner(&state.trick.plays, led, hokm) else {
        return Err(RulesError::InvalidPhase {
            actual: state.phase,
        });
    };

    let winner_team = team_of(winner);
    state.trick_counts[winner_team] += 1;
    state.trick.clear();
    events.push(GameEvent::TrickResolved {
        winner,
        trick_counts: state.trick_counts,
    });

    if state.trick_counts[winner_team] >= TRICKS_TO_WIN_HAND {
        complete_hand(state, &mut events, winner_team as u8);
    } else {
        state.turn = Some(winner);
        events.push(GameEvent::TurnStarted { seat: winner });
    }
    Ok(events)
}

/// Free a player's seat. Their hand stays with the seat so a replacement
/// joiner (or the same player re-joining) inherits it mid-hand.
pub fn vacate(state: &mut RoomState, player_id: Uuid) -> Result<Vec<GameEvent>, RulesError> {
    let Some(seat) = state.seat_of(player_id) else {
        return Err(RulesError::SeatNotInRoom);
    };
    let username = state.slots[seat as usize]
        .take()
        .map(|occupant| occupant.username)
        .unwrap_or_default();
    Ok(vec![GameEvent::PlayerLeft { seat, username }])
}

/// Mark the room unrecoverable. Players are informed and no further play is
/// accepted; joins and actions fail with InvalidPhase from then on.
pub fn quarantine(state: &mut RoomState, reason: &str) -> Vec<GameEvent> {
    state.fault = Some(reason.to_string());
    state.phase = Phase::GameOver;
    state.turn = None;
    vec![GameEvent::GameQuarantined {
        reason: reason.to_string(),
    }]
}

fn start_game(state: &mut RoomState, events: &mut Vec<GameEvent>) {
    state.phase = Phase::TeamAssignment;
    let hakem = state.hakem.unwrap_or(0);
    state.hakem = Some(hakem);
    events.push(GameEvent::TeamsAssigned { hakem });
    begin_deal(state, events);
}

/// Shuffle for the current hand index and deal the opening five cards,
/// leaving HOKM_SELECTION waiting on the hakem.
fn begin_deal(state: &mut RoomState, events: &mut Vec<GameEvent>) {
    let hakem = state.hakem.unwrap_or(0);
    let seed = dealing::hand_seed(state.deal_seed, state.hand_index());
    state.deck = dealing::shuffled_deck(seed);
    state.hands = Default::default();
    dealing::deal_round(
        &mut state.deck,
        &mut state.hands,
        hakem,
        dealing::INITIAL_DEAL,
    );
    events.push(GameEvent::InitialDealDealt);

    state.phase = Phase::HokmSelection;
    state.turn = Some(hakem);
    events.push(GameEvent::TurnStarted { seat: hakem });
}

fn complete_hand(state: &mut RoomState, events: &mut Vec<GameEvent>, winning_team: u8) {
    state.phase = Phase::HandComplete;
    state.turn = None;
    let final_counts = state.trick_counts;
    state.hand_wins[winning_team as usize] += 1;

    let game_complete = state.hand_wins[winning_team as usize] >= HANDS_TO_WIN_GAME;
    events.push(GameEvent::HandCompleted {
        winning_team,
        trick_counts: final_counts,
        hand_wins: state.hand_wins,
        game_complete,
    });

    state.trick_counts = [0, 0];
    state.hokm = None;
    state.trick.clear();

    if game_complete {
        state.phase = Phase::GameOver;
        state.hands = Default::default();
        state.deck.clear();
        return;
    }

    // Hakem passes clockwise for the next hand.
    let hakem = next_seat(state.hakem.unwrap_or(0));
    state.hakem = Some(hakem);
    begin_deal(state, events);
}
