//! Trick comparison rules: hokm over led suit, rank within a suit.

use crate::domain::cards::{Card, Suit};
use crate::domain::state::Seat;

/// True when `candidate` beats `best`, given the led suit and hokm.
///
/// Ranking: any hokm beats any non-hokm; within hokm, higher rank wins;
/// otherwise only cards of the led suit compete, higher rank winning.
/// A card that neither follows the led suit nor trumps can never win.
pub fn card_beats(candidate: Card, best: Card, led: Suit, hokm: Suit) -> bool {
    let cand_hokm = candidate.suit == hokm;
    let best_hokm = best.suit == hokm;
    match (cand_hokm, best_hokm) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => candidate.rank > best.rank,
        (false, false) => {
            let cand_led = candidate.suit == led;
            let best_led = best.suit == led;
            match (cand_led, best_led) {
                (true, false) => true,
                (false, true) => false,
                (true, true) => candidate.rank > best.rank,
                (false, false) => false,
            }
        }
    }
}

pub fn hand_has_suit(hand: &[Card], suit: Suit) -> bool {
    hand.iter().any(|c| c.suit == suit)
}

/// Compute legal cards for a hand given the led suit, independent of turn
/// enforcement. With no led suit (leading) the whole hand is legal.
pub fn legal_moves(hand: &[Card], led: Option<Suit>) -> Vec<Card> {
    if let Some(led) = led {
        if hand_has_suit(hand, led) {
            let mut v: Vec<Card> = hand.iter().copied().filter(|c| c.suit == led).collect();
            v.sort();
            return v;
        }
    }
    let mut any = hand.to_vec();
    any.sort();
    any
}

/// Resolve the winner of a complete trick. Returns None unless exactly four
/// plays are present.
pub fn trick_winner(plays: &[(Seat, Card)], led: Suit, hokm: Suit) -> Option<Seat> {
    if plays.len() != 4 {
        return None;
    }
    let mut best_idx = 0usize;
    for i in 1..plays.len() {
        let (_, card_i) = plays[i];
        let (_, card_best) = plays[best_idx];
        if card_beats(card_i, card_best, led, hokm) {
            best_idx = i;
        }
    }
    Some(plays[best_idx].0)
}
