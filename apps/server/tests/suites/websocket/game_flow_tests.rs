//! Game flow over the wire: seating, the hokm call, trick play, and seat
//! turnover.

use std::sync::Arc;
use std::time::Duration;

use server::domain::state::{Phase, RoomState, SeatOccupant};
use server::identity::Credentials;
use server::store::codec;
use server::{DevIdentityProvider, IdentityProvider, MemoryBackend, StoreBackend};

use crate::support::game::{dominant_suit, pick_legal, suit_name, suit_of, NAMES};
use crate::support::{fast_config, seat_four, start_memory_server, start_test_server, WsClient};

#[tokio::test]
async fn seating_assigns_teams_deals_and_prompts_the_hakem(
) -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;

    let mut first = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    first.expect("welcome").await?;
    first.join(None).await?;
    let joined = first.expect("room_joined").await?;
    assert_eq!(joined["seat"], 0);
    assert_eq!(joined["game_state"]["phase"], "WAITING_FOR_PLAYERS");
    let room_code = joined["room_code"]
        .as_str()
        .ok_or("room_joined without room_code")?
        .to_string();

    let mut others = Vec::new();
    for (seat, name) in ["bob", "cam", "dia"].iter().enumerate() {
        let mut client = WsClient::connect_retry(&server.url(name), Duration::from_secs(2)).await?;
        client.expect("welcome").await?;
        client.join(Some(&room_code)).await?;
        let joined = client.expect("room_joined").await?;
        assert_eq!(joined["seat"], seat + 1);
        others.push(client);
    }

    // Seat 0 heard each arrival in order.
    for (seat, name) in ["bob", "cam", "dia"].iter().enumerate() {
        let arrival = first.expect("player_joined").await?;
        assert_eq!(arrival["seat"], seat + 1);
        assert_eq!(arrival["username"], *name);
    }

    // The fourth join completes the table: teams, a five-card deal, and the
    // hakem's prompt, in that order on every connection.
    let assignment = first.expect("team_assignment").await?;
    assert_eq!(assignment["teams"], serde_json::json!([[0, 2], [1, 3]]));
    assert_eq!(assignment["hakem"], 0);

    let deal = first.expect("initial_deal").await?;
    assert_eq!(deal["hand"].as_array().map(Vec::len), Some(5));

    let prompt = first.expect("turn_start").await?;
    assert_eq!(prompt["current_player"], 0);
    assert_eq!(prompt["your_turn"], true);

    let last = others.last_mut().ok_or("missing fourth client")?;
    last.expect("team_assignment").await?;
    let deal = last.expect("initial_deal").await?;
    assert_eq!(deal["hand"].as_array().map(Vec::len), Some(5));
    let prompt = last.expect("turn_start").await?;
    assert_eq!(prompt["current_player"], 0);
    assert_eq!(prompt["your_turn"], false);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn hokm_selection_belongs_to_the_hakem() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;
    let mut table = seat_four(&server).await?;

    // Not the hakem.
    table.clients[1].select_hokm("hearts").await?;
    table.clients[1].expect_error("not_your_turn").await?;

    // Unknown suit never reaches the rules.
    table.clients[0].select_hokm("notrumps").await?;
    table.clients[0].expect_error("bad_request").await?;

    let suit = dominant_suit(&table.hands[0]);
    table.clients[0].select_hokm(suit_name(suit)).await?;

    for client in &mut table.clients {
        let selected = client.expect("hokm_selected").await?;
        assert_eq!(selected["suit"], suit_name(suit));
        let deal = client.expect("final_deal").await?;
        assert_eq!(deal["hand"].as_array().map(Vec::len), Some(13));
        let prompt = client.expect("turn_start").await?;
        assert_eq!(prompt["current_player"], 0);
    }

    // Once play begins a second call is out of phase.
    table.clients[0].select_hokm("hearts").await?;
    table.clients[0].expect_error("invalid_phase").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn a_full_trick_produces_a_result() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;
    let mut table = seat_four(&server).await?;
    table.select_hokm_and_drain().await?;

    // The hakem leads; everyone must follow the led suit if they can. Each
    // later seat waits for its own prompt so plays land in order.
    let lead = table.hands[0][0].clone();
    let led = suit_of(&lead);
    table.clients[0].play_card(&lead).await?;
    for seat in 1..4 {
        table.clients[seat].expect_your_turn().await?;
        let card = pick_legal(&table.hands[seat], Some(led));
        table.clients[seat].play_card(&card).await?;
    }

    // Seat 0 sees exactly four plays, then the result.
    let mut plays_seen = 0;
    let result = loop {
        let msg = table.clients[0].recv_json().await?;
        match msg["type"].as_str() {
            Some("card_played") => plays_seen += 1,
            Some("turn_start") => {}
            Some("trick_result") => break msg,
            other => return Err(format!("unexpected frame {other:?}").into()),
        }
    };
    assert_eq!(plays_seen, 4);

    let winner = result["winner"].as_u64().ok_or("trick_result without winner")?;
    assert!(winner < 4);
    let taken = result["tricks"][0].as_u64().unwrap_or(0) + result["tricks"][1].as_u64().unwrap_or(0);
    assert_eq!(taken, 1);

    server.stop().await;
    Ok(())
}

/// Seeds a mid-game position straight into the store, then lets players
/// adopt their seats over the socket. Hands are rigged so every rules error
/// is reachable deterministically.
#[tokio::test]
async fn rule_violations_are_rejected_in_a_crafted_position(
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = fast_config();
    config.grace_period = Duration::from_secs(5);
    let backend = Arc::new(MemoryBackend::new());

    let provider = DevIdentityProvider::new();
    let room_code = test_support::unique_room_code();
    let mut state = RoomState::new(room_code.clone(), 42);
    for (seat, name) in NAMES.iter().enumerate() {
        let identity = provider
            .authenticate(&Credentials {
                username: (*name).to_string(),
            })
            .await?;
        state.slots[seat] = Some(SeatOccupant {
            player_id: identity.player_id,
            username: identity.username,
        });
    }
    state.phase = Phase::Gameplay;
    state.hokm = Some("spades".parse()?);
    state.hakem = Some(0);
    state.turn = Some(0);
    // A full first-trick deal: all hearts sit with seats 0 and 1, so seats 2
    // and 3 discard freely while seat 1 is forced to follow.
    state.hands = [
        "AH KH QH JH TH 9H 8H AS KS QS JS TS 9S",
        "2H 3H 4H 5H 6H 7H 3S 2S AC KC QC JC TC",
        "AD KD QD JD TD 9D 8D 7D 6D 5D 4D 8S 7S",
        "9C 8C 7C 6C 5C 4C 3C 2C 3D 2D 6S 5S 4S",
    ]
    .map(|hand| {
        hand.split_whitespace()
            .map(|card| card.parse().unwrap())
            .collect()
    });

    backend
        .put(
            &codec::room_key(&room_code),
            &codec::room_to_fields(&state),
            Duration::from_secs(600),
        )
        .await?;
    let server = start_test_server(config, backend).await?;

    let mut clients = Vec::new();
    for name in NAMES {
        let mut client = WsClient::connect_retry(&server.url(name), Duration::from_secs(2)).await?;
        client.expect("welcome").await?;
        client.join(Some(room_code.as_str())).await?;
        let joined = client.expect("room_joined").await?;
        assert_eq!(joined["game_state"]["phase"], "GAMEPLAY");
        clients.push(client);
    }

    // Out of turn.
    clients[2].play_card("4D").await?;
    clients[2].expect_error("not_your_turn").await?;

    // Hearts are led.
    clients[0].play_card("AH").await?;
    clients[1].expect_your_turn().await?;

    // Holding a heart, the spade is refused.
    clients[1].play_card("3S").await?;
    clients[1].expect_error("suit_follow_violation").await?;

    // As is a card not in the hand at all.
    clients[1].play_card("9C").await?;
    clients[1].expect_error("card_not_in_hand").await?;

    clients[1].play_card("2H").await?;
    clients[2].expect_your_turn().await?;
    clients[2].play_card("4D").await?;
    clients[3].expect_your_turn().await?;
    clients[3].play_card("5C").await?;

    // No trump appeared, so the high heart takes the trick.
    let result = clients[0].expect_eventually("trick_result").await?;
    assert_eq!(result["winner"], 0);
    assert_eq!(result["tricks"][0], 1);
    assert_eq!(result["tricks"][1], 0);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn leaving_vacates_the_seat_but_keeps_the_hand() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;
    let mut table = seat_four(&server).await?;

    table.clients[3].leave().await?;
    table.clients[3].expect("room_left").await?;

    let left = table.clients[0].expect_eventually("player_left").await?;
    assert_eq!(left["seat"], 3);
    assert_eq!(left["username"], "dia");

    // A new player adopts the vacated seat, hand and all.
    let mut eve = WsClient::connect_retry(&server.url("eve"), Duration::from_secs(2)).await?;
    eve.expect("welcome").await?;
    eve.join(Some(table.room_code.as_str())).await?;
    let joined = eve.expect("room_joined").await?;
    assert_eq!(joined["seat"], 3);
    assert_eq!(joined["game_state"]["phase"], "HOKM_SELECTION");
    assert_eq!(joined["game_state"]["hand"].as_array().map(Vec::len), Some(5));

    let arrival = table.clients[0].expect_eventually("player_joined").await?;
    assert_eq!(arrival["seat"], 3);
    assert_eq!(arrival["username"], "eve");

    server.stop().await;
    Ok(())
}
