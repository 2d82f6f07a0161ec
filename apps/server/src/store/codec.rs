//! Field-map codec for room state.
//!
//! One room is one flat hash under `room:{code}:state`. Scalars are plain
//! strings, collections are JSON documents inside string values, and the two
//! team-indexed counters are JSON objects whose keys must be the canonical
//! decimal form ("0", "1"). Anything that fails to decode comes back as
//! `StoreError::Corrupt` so the caller can quarantine the room instead of
//! playing on over bad state.

use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use uuid::Uuid;

use crate::domain::cards::{Card, Suit};
use crate::domain::dealing::{DECK_SIZE, FINAL_DEAL, INITIAL_DEAL};
use crate::domain::state::{Phase, RoomState, Seat, SeatOccupant, Trick, SEATS, TEAMS};
use crate::store::{Fields, StoreError};

const FIELD_PHASE: &str = "phase";
const FIELD_PLAYERS: &str = "players";
const FIELD_TEAMS: &str = "teams";
const FIELD_HAKEM: &str = "hakem";
const FIELD_HOKM: &str = "hokm";
const FIELD_CURRENT_TURN: &str = "current_turn";
const FIELD_TRICK: &str = "trick";
const FIELD_LED_SUIT: &str = "led_suit";
const FIELD_DECK: &str = "deck";
const FIELD_TRICKS: &str = "tricks";
const FIELD_ROUND_SCORES: &str = "round_scores";
const FIELD_DEAL_SEED: &str = "deal_seed";
const FIELD_FAULT: &str = "fault";

pub fn room_key(room_code: &str) -> String {
    format!("room:{room_code}:state")
}

pub fn session_key(player_id: Uuid) -> String {
    format!("session:{player_id}")
}

fn hand_field(seat: usize) -> String {
    format!("hand_{seat}")
}

/// Encode the full room. Every field is always written, with the empty
/// string standing in for absent optionals, so a save fully replaces the
/// previous record and leaves no stale leftovers behind.
pub fn room_to_fields(state: &RoomState) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_PHASE.into(), state.phase.as_str().into());
    fields.insert(FIELD_PLAYERS.into(), encode_json(&state.slots));
    fields.insert(FIELD_TEAMS.into(), encode_json(&TEAMS));
    fields.insert(FIELD_HAKEM.into(), encode_opt(state.hakem));
    fields.insert(
        FIELD_HOKM.into(),
        state.hokm.map(|s| s.as_str().to_string()).unwrap_or_default(),
    );
    fields.insert(FIELD_CURRENT_TURN.into(), encode_opt(state.turn));
    fields.insert(FIELD_TRICK.into(), encode_json(&state.trick.plays));
    fields.insert(
        FIELD_LED_SUIT.into(),
        state
            .trick
            .led
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
    );
    fields.insert(FIELD_DECK.into(), encode_json(&state.deck));
    fields.insert(FIELD_TRICKS.into(), encode_team_counts(state.trick_counts));
    fields.insert(
        FIELD_ROUND_SCORES.into(),
        encode_team_counts(state.hand_wins),
    );
    for (seat, hand) in state.hands.iter().enumerate() {
        fields.insert(hand_field(seat), encode_json(hand));
    }
    fields.insert(FIELD_DEAL_SEED.into(), state.deal_seed.to_string());
    fields.insert(FIELD_FAULT.into(), state.fault.clone().unwrap_or_default());
    fields
}

/// Decode and validate a stored room. The room code comes from the key, not
/// the record.
pub fn room_from_fields(room_code: &str, fields: &Fields) -> Result<RoomState, StoreError> {
    let phase_raw = required(fields, FIELD_PHASE)?;
    let phase = Phase::from_stored(phase_raw)
        .ok_or_else(|| StoreError::corrupt(format!("{FIELD_PHASE}: unknown value {phase_raw:?}")))?;

    let slots: [Option<SeatOccupant>; SEATS] = decode_json(fields, FIELD_PLAYERS)?;
    let teams: [[Seat; 2]; 2] = decode_json(fields, FIELD_TEAMS)?;
    if teams != TEAMS {
        return Err(StoreError::corrupt(format!(
            "{FIELD_TEAMS}: unexpected partition {teams:?}"
        )));
    }

    let hakem = decode_opt_seat(fields, FIELD_HAKEM)?;
    let hokm = decode_opt_suit(fields, FIELD_HOKM)?;
    let turn = decode_opt_seat(fields, FIELD_CURRENT_TURN)?;
    let plays: Vec<(Seat, Card)> = decode_json(fields, FIELD_TRICK)?;
    let led = decode_opt_suit(fields, FIELD_LED_SUIT)?;
    let deck: Vec<Card> = decode_json(fields, FIELD_DECK)?;
    let trick_counts = decode_team_counts(fields, FIELD_TRICKS)?;
    let hand_wins = decode_team_counts(fields, FIELD_ROUND_SCORES)?;

    let mut hands: [Vec<Card>; SEATS] = Default::default();
    for (seat, hand) in hands.iter_mut().enumerate() {
        *hand = decode_json(fields, &hand_field(seat))?;
    }

    let deal_seed = canonical_number::<u64>(required(fields, FIELD_DEAL_SEED)?, FIELD_DEAL_SEED)?;
    let fault = match required(fields, FIELD_FAULT)? {
        "" => None,
        reason => Some(reason.to_string()),
    };

    let state = RoomState {
        room_code: room_code.to_string(),
        slots,
        phase,
        deck,
        hands,
        hokm,
        hakem,
        trick: Trick { plays, led },
        turn,
        trick_counts,
        hand_wins,
        deal_seed,
        fault,
    };
    validate(&state)?;
    Ok(state)
}

/// Cross-field consistency checks. A record that decodes field by field can
/// still describe an impossible table; catching it here turns a silent bad
/// game into a quarantined room.
fn validate(state: &RoomState) -> Result<(), StoreError> {
    let seat_ok = |seat: Option<Seat>| seat.is_none_or(|s| (s as usize) < SEATS);
    if !seat_ok(state.hakem) || !seat_ok(state.turn) {
        return Err(StoreError::corrupt("seat index out of range"));
    }

    let plays = &state.trick.plays;
    if plays.len() > SEATS {
        return Err(StoreError::corrupt(format!(
            "trick holds {} plays",
            plays.len()
        )));
    }
    let mut seats_seen = HashSet::new();
    for (seat, _) in plays {
        if (*seat as usize) >= SEATS || !seats_seen.insert(*seat) {
            return Err(StoreError::corrupt("trick seats invalid or repeated"));
        }
    }
    match (plays.first(), state.trick.led) {
        (Some((_, first)), Some(led)) if first.suit != led => {
            return Err(StoreError::corrupt("led_suit disagrees with first play"));
        }
        (Some(_), None) => {
            return Err(StoreError::corrupt("trick has plays but no led_suit"));
        }
        (None, Some(_)) => {
            return Err(StoreError::corrupt("led_suit set on an empty trick"));
        }
        _ => {}
    }
    if let Some(turn) = state.turn {
        if plays.iter().any(|(seat, _)| *seat == turn) {
            return Err(StoreError::corrupt("current_turn already played this trick"));
        }
    }

    if state.phase == Phase::Gameplay && state.hokm.is_none() {
        return Err(StoreError::corrupt("gameplay phase without hokm"));
    }

    let mut cards_seen = HashSet::new();
    let all_cards = state
        .deck
        .iter()
        .chain(state.hands.iter().flatten())
        .chain(plays.iter().map(|(_, card)| card));
    for card in all_cards {
        if !cards_seen.insert(*card) {
            return Err(StoreError::corrupt(format!("duplicate card {card}")));
        }
    }

    if state.trick_counts.iter().map(|&n| n as u32).sum::<u32>() > 13 {
        return Err(StoreError::corrupt("trick counts exceed a full hand"));
    }

    // Card conservation per phase. A record short a few cards decodes field
    // by field, then underflows the dealer or strands the turn on an empty
    // hand; reject it here so the room is quarantined instead.
    let resolved = state.trick_counts.iter().map(|&n| n as usize).sum::<usize>();
    let held: usize = state.hands.iter().map(Vec::len).sum();
    match state.phase {
        Phase::WaitingForPlayers => {
            if state.deck.len() + held + plays.len() != 0 || resolved != 0 {
                return Err(StoreError::corrupt("cards on the table before the deal"));
            }
        }
        Phase::HokmSelection => {
            if state.deck.len() != SEATS * FINAL_DEAL {
                return Err(StoreError::corrupt(format!(
                    "deck holds {} cards awaiting the final deal",
                    state.deck.len()
                )));
            }
            if state.hands.iter().any(|hand| hand.len() != INITIAL_DEAL)
                || !plays.is_empty()
                || resolved != 0
            {
                return Err(StoreError::corrupt("table does not match an opening deal"));
            }
        }
        Phase::Gameplay => {
            if !state.deck.is_empty() {
                return Err(StoreError::corrupt("undealt cards during play"));
            }
            if held + plays.len() + SEATS * resolved != DECK_SIZE {
                return Err(StoreError::corrupt(format!(
                    "{} cards in play with {resolved} tricks resolved",
                    held + plays.len()
                )));
            }
        }
        // GameOver keeps whatever the final or quarantined position held.
        _ => {}
    }
    Ok(())
}

fn required<'a>(fields: &'a Fields, name: &str) -> Result<&'a str, StoreError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StoreError::corrupt(format!("missing field {name}")))
}

fn encode_json<T: serde::Serialize>(value: &T) -> String {
    // All codec types serialize infallibly; a failure here is a programming
    // error, and an empty document decodes as corrupt rather than panicking.
    serde_json::to_string(value).unwrap_or_default()
}

fn decode_json<T: serde::de::DeserializeOwned>(
    fields: &Fields,
    name: &str,
) -> Result<T, StoreError> {
    let raw = required(fields, name)?;
    serde_json::from_str(raw).map_err(|err| StoreError::corrupt(format!("{name}: {err}")))
}

fn encode_opt(value: Option<Seat>) -> String {
    value.map(|s| s.to_string()).unwrap_or_default()
}

/// Parse a number and insist on the canonical decimal spelling: "01", " 1",
/// and "+1" all decode to the same value but are rejected as corrupt.
fn canonical_number<T>(raw: &str, name: &str) -> Result<T, StoreError>
where
    T: FromStr + Display,
{
    raw.parse::<T>()
        .ok()
        .filter(|n| n.to_string() == raw)
        .ok_or_else(|| StoreError::corrupt(format!("{name}: non-canonical number {raw:?}")))
}

fn decode_opt_seat(fields: &Fields, name: &str) -> Result<Option<Seat>, StoreError> {
    match required(fields, name)? {
        "" => Ok(None),
        raw => canonical_number::<Seat>(raw, name).map(Some),
    }
}

fn decode_opt_suit(fields: &Fields, name: &str) -> Result<Option<Suit>, StoreError> {
    match required(fields, name)? {
        "" => Ok(None),
        raw => raw
            .parse::<Suit>()
            .map(Some)
            .map_err(|_| StoreError::corrupt(format!("{name}: unknown suit {raw:?}"))),
    }
}

fn encode_team_counts(counts: [u8; 2]) -> String {
    let mut map = serde_json::Map::new();
    map.insert("0".to_string(), counts[0].into());
    map.insert("1".to_string(), counts[1].into());
    serde_json::Value::Object(map).to_string()
}

fn decode_team_counts(fields: &Fields, name: &str) -> Result<[u8; 2], StoreError> {
    let raw = required(fields, name)?;
    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|err| StoreError::corrupt(format!("{name}: {err}")))?;
    if map.len() != 2 {
        return Err(StoreError::corrupt(format!(
            "{name}: expected two team keys, got {}",
            map.len()
        )));
    }
    let mut counts = [0u8; 2];
    for (key, value) in &map {
        let team = canonical_number::<usize>(key, name)?;
        if team > 1 {
            return Err(StoreError::corrupt(format!("{name}: team key {team}")));
        }
        counts[team] = value
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or_else(|| StoreError::corrupt(format!("{name}: bad count {value}")))?;
    }
    Ok(counts)
}
