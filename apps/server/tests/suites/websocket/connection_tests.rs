//! Connection lifecycle: handshake identity, duplicate-connection policy,
//! and framing discipline.

use std::sync::Arc;
use std::time::Duration;

use server::MemoryBackend;

use crate::support::{
    fast_config, start_memory_server, start_test_server, wait_until, WsClient,
};

#[tokio::test]
async fn welcome_carries_a_stable_player_identity() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;

    let mut client = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    let welcome = client.expect("welcome").await?;
    assert_eq!(welcome["username"], "ada");
    let first_id = welcome["player_id"]
        .as_str()
        .ok_or("welcome without player_id")?
        .to_string();
    client.close().await?;

    let registry = server.state.registry.clone();
    assert!(
        wait_until(|| registry.active_connections() == 0, Duration::from_secs(2)).await,
        "first connection never released"
    );

    // Same username on a fresh socket resolves to the same identity.
    let mut again = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    let welcome = again.expect("welcome").await?;
    assert_eq!(welcome["player_id"], first_id.as_str());

    // A different username must not.
    let mut other = WsClient::connect_retry(&server.url("bob"), Duration::from_secs(2)).await?;
    let welcome = other.expect("welcome").await?;
    assert_ne!(welcome["player_id"], first_id.as_str());

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn bad_usernames_fail_the_handshake() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;

    // Too short, invalid characters, missing entirely: all rejected before
    // the upgrade completes.
    assert!(WsClient::connect(&server.url("ab")).await.is_err());
    assert!(WsClient::connect(&server.url("bad%21name")).await.is_err());
    assert!(WsClient::connect(&format!("ws://{}/ws", server.addr))
        .await
        .is_err());

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn second_connection_for_the_same_player_is_rejected() -> Result<(), Box<dyn std::error::Error>>
{
    let server = start_memory_server().await?;

    let mut first = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    first.expect("welcome").await?;

    let mut second = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    second.expect_error("already_connected").await?;
    second.expect_closed().await?;

    // The original connection is untouched.
    first.join(None).await?;
    first.expect("room_joined").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn takeover_hands_the_session_to_the_newest_socket() -> Result<(), Box<dyn std::error::Error>>
{
    let mut config = fast_config();
    config.takeover_enabled = true;
    let server = start_test_server(config, Arc::new(MemoryBackend::new())).await?;

    let mut first = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    first.expect("welcome").await?;

    let mut second = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    second.expect("welcome").await?;

    // The older socket is shut down, the newer one stays usable.
    first.expect_closed().await?;
    second.join(None).await?;
    second.expect("room_joined").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn malformed_frames_get_an_error_but_keep_the_socket() -> Result<(), Box<dyn std::error::Error>>
{
    let server = start_memory_server().await?;

    let mut client = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    client.expect("welcome").await?;

    client.send_raw("not json").await?;
    client.expect_error("bad_request").await?;

    client.send_raw(r#"{"type":"warp_drive"}"#).await?;
    client.expect_error("bad_request").await?;

    client.send_raw(r#"{"type":"play_card","card":"XX"}"#).await?;
    client.expect_error("bad_request").await?;

    client.send_binary(vec![0x01, 0x02]).await?;
    client.expect_error("bad_request").await?;

    // After all that abuse the connection still works.
    client.join(None).await?;
    client.expect("room_joined").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn commands_outside_a_room_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;

    let mut client = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    let welcome = client.expect("welcome").await?;
    let player_id = welcome["player_id"]
        .as_str()
        .ok_or("welcome without player_id")?
        .to_string();

    client.play_card("AS").await?;
    client.expect_error("not_in_room").await?;

    client.select_hokm("hearts").await?;
    client.expect_error("not_in_room").await?;

    client.leave().await?;
    client.expect_error("not_in_room").await?;

    // Reconnecting with someone else's id is an identity violation.
    client
        .reconnect("00000000-0000-0000-0000-00000000dead")
        .await?;
    client.expect_error("identity_mismatch").await?;

    // Reconnecting with your own id when no session exists anywhere.
    client.reconnect(&player_id).await?;
    client.expect_error("session_not_found").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn joining_requires_a_resolvable_room_code() -> Result<(), Box<dyn std::error::Error>> {
    let server = start_memory_server().await?;

    let mut client = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    client.expect("welcome").await?;

    // Well-formed but unknown.
    client.join(Some("ZZZ999")).await?;
    client.expect_error("room_not_found").await?;

    // Malformed: too short, then an alphabet violation.
    client.join(Some("AB")).await?;
    client.expect_error("bad_request").await?;
    client.join(Some("ABCU")).await?;
    client.expect_error("bad_request").await?;

    // Creating works, and a second join while seated is refused.
    client.join(None).await?;
    let joined = client.expect("room_joined").await?;
    assert_eq!(joined["seat"], 0);
    client.join(None).await?;
    client.expect_error("bad_request").await?;

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn rapid_double_join_claims_a_single_seat() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(MemoryBackend::new());
    // A slow store keeps the first join in flight while the second frame
    // arrives.
    backend.set_delay(Duration::from_millis(50));
    let server = start_test_server(fast_config(), backend.clone()).await?;

    let mut client = WsClient::connect_retry(&server.url("ada"), Duration::from_secs(2)).await?;
    client.expect("welcome").await?;

    // Two joins in the same breath: exactly one may win a seat.
    client.join(None).await?;
    client.join(None).await?;

    let mut seated = 0;
    let mut refused = 0;
    for _ in 0..2 {
        let msg = client.recv_json().await?;
        match msg["type"].as_str() {
            Some("room_joined") => seated += 1,
            Some("error") => {
                assert_eq!(msg["code"], "bad_request");
                refused += 1;
            }
            other => return Err(format!("unexpected frame {other:?}").into()),
        }
    }
    assert_eq!((seated, refused), (1, 1));

    // One room in the store, not one per join frame.
    let rooms = backend
        .dump()
        .into_keys()
        .filter(|key| key.starts_with("room:"))
        .count();
    assert_eq!(rooms, 1);

    server.stop().await;
    Ok(())
}
