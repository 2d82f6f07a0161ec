//! Deterministic card dealing.
//!
//! Hokm deals in two stages: five cards per seat before hokm selection, eight
//! more after. Both stages must come from one shuffle so a failover instance
//! holding only the persisted seed and the undealt deck reproduces the exact
//! same final hands.

use crate::domain::cards::{Card, Rank, Suit};
use crate::domain::state::{next_seat, Seat, SEATS};

pub const DECK_SIZE: usize = 52;
pub const INITIAL_DEAL: usize = 5;
pub const FINAL_DEAL: usize = 8;

/// Generate a full 52-card deck in standard order.
pub fn full_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            deck.push(Card { suit, rank });
        }
    }
    deck
}

/// Simple deterministic RNG for shuffling.
///
/// SplitMix64-style generator: well distributed, fast, and stable across
/// dependency upgrades. The shuffle for a given seed must never change, since
/// seeds are persisted and replayed on other instances.
struct SimpleLcg {
    state: u64,
}

impl SimpleLcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z ^= z >> 30;
        z = z.wrapping_mul(0xBF58476D1CE4E5B9);
        z ^= z >> 27;
        z = z.wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    fn next_range(&mut self, max: usize) -> usize {
        let m = max as u64;
        // Largest multiple of m that fits in u64; rejection sampling avoids
        // modulo bias.
        let limit = u64::MAX - (u64::MAX % m);
        loop {
            let x = self.next();
            if x < limit {
                return (x % m) as usize;
            }
        }
    }
}

/// Fisher-Yates shuffle using the deterministic RNG.
fn shuffle_with_seed(deck: &mut [Card], seed: u64) {
    let mut rng = SimpleLcg::new(seed);
    for i in (1..deck.len()).rev() {
        let j = rng.next_range(i + 1);
        deck.swap(i, j);
    }
}

/// Full deck shuffled for the given seed.
pub fn shuffled_deck(seed: u64) -> Vec<Card> {
    let mut deck = full_deck();
    shuffle_with_seed(&mut deck, seed);
    deck
}

/// Derive the shuffle seed for one hand from the room's base seed. Each hand
/// gets a distinct, reproducible shuffle.
pub fn hand_seed(deal_seed: u64, hand_index: u32) -> u64 {
    // One SplitMix64 step keeps consecutive hand indices uncorrelated.
    SimpleLcg::new(deal_seed ^ u64::from(hand_index)).next()
}

/// Deal `count` cards to each seat from the front of `deck`, starting at
/// `first` and proceeding clockwise. Dealt cards are appended to `hands` and
/// each touched hand is re-sorted.
pub fn deal_round(deck: &mut Vec<Card>, hands: &mut [Vec<Card>; SEATS], first: Seat, count: usize) {
    let mut seat = first;
    for _ in 0..SEATS {
        let dealt: Vec<Card> = deck.drain(..count).collect();
        hands[seat as usize].extend(dealt);
        hands[seat as usize].sort();
        seat = next_seat(seat);
    }
}
