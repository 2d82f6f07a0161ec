//! Disconnection, grace, and resumption.

use std::sync::Arc;
use std::time::Duration;

use server::identity::Credentials;
use server::store::codec;
use server::store::Fields;
use server::{DevIdentityProvider, IdentityProvider, MemoryBackend, StoreBackend};

use crate::support::{fast_config, seat_four, start_memory_server, start_test_server, WsClient};

#[tokio::test]
async fn a_dropped_player_can_resume_within_grace() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = fast_config();
    config.grace_period = Duration::from_secs(5);
    let server = start_test_server(config, Arc::new(MemoryBackend::new())).await?;
    let mut table = seat_four(&server).await?;
    let bob_id = table.player_ids[1].clone();

    // The socket dies without a leave; the seat is held.
    table.clients[1].close().await?;
    let gone = table.clients[0].expect_eventually("player_disconnected").await?;
    assert_eq!(gone["seat"], 1);

    let mut bob = WsClient::connect_retry(&server.url("bob"), Duration::from_secs(2)).await?;
    let welcome = bob.expect("welcome").await?;
    assert_eq!(welcome["player_id"], bob_id.as_str());

    bob.reconnect(&bob_id).await?;
    let resumed = bob.expect("reconnect_success").await?;
    assert_eq!(resumed["game_state"]["seat"], 1);
    assert_eq!(resumed["game_state"]["phase"], "HOKM_SELECTION");
    assert_eq!(
        resumed["game_state"]["hand"].as_array().map(Vec::len),
        Some(5)
    );

    let back = table.clients[0].expect_eventually("player_reconnected").await?;
    assert_eq!(back["seat"], 1);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn reconnecting_on_your_own_turn_is_reprompted() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = fast_config();
    config.grace_period = Duration::from_secs(5);
    let server = start_test_server(config, Arc::new(MemoryBackend::new())).await?;
    let mut table = seat_four(&server).await?;
    let ada_id = table.player_ids[0].clone();

    // The hakem is on turn when the line drops.
    table.clients[0].close().await?;
    let gone = table.clients[1].expect_eventually("player_disconnected").await?;
    assert_eq!(gone["seat"], 0);

    let mut ada = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    ada.expect("welcome").await?;
    ada.reconnect(&ada_id).await?;
    ada.expect("reconnect_success").await?;

    // The prompt is re-sent so the table cannot stall on a lost frame.
    let prompt = ada.expect("turn_start").await?;
    assert_eq!(prompt["current_player"], 0);
    assert_eq!(prompt["your_turn"], true);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn grace_expiry_releases_the_seat() -> Result<(), Box<dyn std::error::Error>> {
    // fast_config keeps the grace period at 250ms.
    let server = start_memory_server().await?;
    let mut table = seat_four(&server).await?;
    let bob_id = table.player_ids[1].clone();

    table.clients[1].close().await?;
    table.clients[0].expect_eventually("player_disconnected").await?;

    // Nobody comes back; the grace timer vacates the seat for everyone.
    let left = table.clients[0].expect_eventually("player_left").await?;
    assert_eq!(left["seat"], 1);
    assert_eq!(left["username"], "bob");

    // Too late to resume.
    let mut bob = WsClient::connect_retry(&server.url("bob"), Duration::from_secs(2)).await?;
    bob.expect("welcome").await?;
    bob.reconnect(&bob_id).await?;
    bob.expect_error("grace_expired").await?;

    // The vacated seat is open to a fresh player.
    let mut eve = WsClient::connect_retry(&server.url("eve"), Duration::from_secs(2)).await?;
    eve.expect("welcome").await?;
    eve.join(Some(table.room_code.as_str())).await?;
    let joined = eve.expect("room_joined").await?;
    assert_eq!(joined["seat"], 1);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn corrupt_session_record_degrades_to_a_fresh_join(
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(MemoryBackend::new());

    // A session record this instance cannot decode, as a half-written store
    // entry would leave behind.
    let provider = DevIdentityProvider::new();
    let ada = provider
        .authenticate(&Credentials {
            username: "ada".to_string(),
        })
        .await?;
    let mut junk = Fields::new();
    junk.insert("status".to_string(), "WEDGED".to_string());
    backend
        .put(
            &codec::session_key(ada.player_id),
            &junk,
            Duration::from_secs(60),
        )
        .await?;

    let server = start_test_server(fast_config(), backend).await?;
    let mut client = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    client.expect("welcome").await?;

    // The undecodable record reads as no session at all, not a dead socket.
    client.reconnect(&ada.player_id.to_string()).await?;
    client.expect_error("session_not_found").await?;

    // The connection is still good for a fresh start.
    client.join(None).await?;
    client.expect("room_joined").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn silent_connections_are_reaped_by_heartbeat() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = fast_config();
    config.heartbeat_interval = Duration::from_millis(100);
    config.heartbeat_miss_limit = 2;
    config.grace_period = Duration::from_secs(5);
    let server = start_test_server(config, Arc::new(MemoryBackend::new())).await?;

    let mut ada = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    ada.expect("welcome").await?;
    ada.join(None).await?;
    let joined = ada.expect("room_joined").await?;
    let room_code = joined["room_code"]
        .as_str()
        .ok_or("room_joined without room_code")?
        .to_string();

    let mut bob = WsClient::connect_retry(&server.url("bob"), Duration::from_secs(2)).await?;
    bob.expect("welcome").await?;
    bob.join(Some(&room_code)).await?;
    bob.expect("room_joined").await?;
    let arrival = ada.expect("player_joined").await?;
    assert_eq!(arrival["seat"], 1);

    // bob's stream is never polled again, so its pings go unanswered. Two
    // missed beats later the server writes the seat off as disconnected.
    let gone = ada.expect_eventually("player_disconnected").await?;
    assert_eq!(gone["seat"], 1);

    drop(bob);
    server.stop().await;
    Ok(())
}
