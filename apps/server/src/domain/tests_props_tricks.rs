//! Property tests for trick comparison and legality.
//!
//! Properties tested:
//! - The resolved winner agrees with a brute-force oracle
//! - No other play in the trick beats the winning card
//! - Any hokm card beats any non-hokm card
//! - card_beats is antisymmetric for distinct cards
//! - Legal moves follow the led suit exactly when the hand can

use proptest::prelude::*;

use crate::domain::cards::{Card, Suit};
use crate::domain::state::Seat;
use crate::domain::tricks::{card_beats, hand_has_suit, legal_moves, trick_winner};
use crate::domain::{test_gens, test_prelude};

/// Independent winner computation: highest hokm if any was played, otherwise
/// highest card of the led suit.
fn oracle_winner(plays: &[(Seat, Card)], led: Suit, hokm: Suit) -> Seat {
    let best = plays
        .iter()
        .filter(|(_, c)| c.suit == hokm)
        .max_by_key(|(_, c)| c.rank)
        .or_else(|| {
            plays
                .iter()
                .filter(|(_, c)| c.suit == led)
                .max_by_key(|(_, c)| c.rank)
        });
    // The leader's card always follows the led suit, so a winner exists.
    best.map(|(seat, _)| *seat).unwrap()
}

proptest! {
    #![proptest_config(test_prelude::proptest_config())]

    #[test]
    fn prop_trick_winner_matches_oracle(
        (plays, led, hokm) in test_gens::complete_trick(),
    ) {
        let winner = trick_winner(&plays, led, hokm);
        prop_assert_eq!(winner, Some(oracle_winner(&plays, led, hokm)));
    }

    #[test]
    fn prop_no_play_beats_the_winning_card(
        (plays, led, hokm) in test_gens::complete_trick(),
    ) {
        let winner = trick_winner(&plays, led, hokm).unwrap();
        let winning_card = plays.iter().find(|(s, _)| *s == winner).unwrap().1;
        for (seat, card) in &plays {
            if *seat != winner {
                prop_assert!(
                    !card_beats(*card, winning_card, led, hokm),
                    "{card} beats winning {winning_card} (led {led}, hokm {hokm})"
                );
            }
        }
    }

    #[test]
    fn prop_any_hokm_beats_any_non_hokm(
        (hokm, hokm_rank, other) in test_gens::suit().prop_flat_map(|hokm| {
            let off = Suit::ALL.into_iter().filter(move |s| *s != hokm);
            (
                Just(hokm),
                test_gens::rank(),
                (prop::sample::select(off.collect::<Vec<_>>()), test_gens::rank())
                    .prop_map(|(suit, rank)| Card { suit, rank }),
            )
        }),
        led in test_gens::suit(),
    ) {
        let trump = Card { suit: hokm, rank: hokm_rank };
        prop_assert!(card_beats(trump, other, led, hokm));
        prop_assert!(!card_beats(other, trump, led, hokm));
    }

    #[test]
    fn prop_card_beats_is_antisymmetric(
        cards in test_gens::unique_cards(2),
        led in test_gens::suit(),
        hokm in test_gens::suit(),
    ) {
        let (a, b) = (cards[0], cards[1]);
        prop_assert!(!(card_beats(a, b, led, hokm) && card_beats(b, a, led, hokm)));
    }

    #[test]
    fn prop_legal_moves_follow_the_led_suit(
        hand in test_gens::hand(),
        led in test_gens::suit(),
    ) {
        let legal = legal_moves(&hand, Some(led));
        prop_assert!(!legal.is_empty());
        if hand_has_suit(&hand, led) {
            let led_count = hand.iter().filter(|c| c.suit == led).count();
            prop_assert_eq!(legal.len(), led_count);
            prop_assert!(legal.iter().all(|c| c.suit == led));
        } else {
            prop_assert_eq!(legal.len(), hand.len());
        }
        for card in &legal {
            prop_assert!(hand.contains(card), "legal {card} not in hand");
        }
    }

    #[test]
    fn prop_leading_hand_is_fully_legal(hand in test_gens::hand()) {
        let legal = legal_moves(&hand, None);
        prop_assert_eq!(legal.len(), hand.len());
    }

    #[test]
    fn prop_void_hand_may_play_anything(
        (led, hand) in test_gens::suit()
            .prop_flat_map(|led| (Just(led), test_gens::hand_without_suit(led))),
    ) {
        // Void by construction: every card in the hand is legal.
        prop_assert_eq!(legal_moves(&hand, Some(led)).len(), hand.len());
    }
}
