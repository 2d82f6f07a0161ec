//! Table-level helpers: seat four players and track what each was dealt.

use std::time::Duration;

use serde_json::Value;

use crate::support::client::WsClient;
use crate::support::server::TestServer;

pub const NAMES: [&str; 4] = ["ada", "bob", "cam", "dia"];

/// A fully seated room. Clients, ids, and hands are indexed by seat.
pub struct Table {
    pub clients: Vec<WsClient>,
    pub player_ids: Vec<String>,
    pub room_code: String,
    /// Card tokens from the most recent deal frame each seat saw.
    pub hands: Vec<Vec<String>>,
}

pub async fn seat_four(server: &TestServer) -> Result<Table, Box<dyn std::error::Error>> {
    seat_four_named(server, NAMES).await
}

/// Connect four players into one room and drain every client to the opening
/// turn prompt, so tests start from a known point.
pub async fn seat_four_named(
    server: &TestServer,
    names: [&str; 4],
) -> Result<Table, Box<dyn std::error::Error>> {
    let mut clients = Vec::new();
    let mut player_ids = Vec::new();
    let mut room_code: Option<String> = None;

    for name in names {
        let mut client = WsClient::connect_retry(&server.url(name), Duration::from_secs(2)).await?;
        let welcome = client.expect("welcome").await?;
        let player_id = welcome["player_id"]
            .as_str()
            .ok_or("welcome without player_id")?
            .to_string();

        client.join(room_code.as_deref()).await?;
        let joined = client.expect("room_joined").await?;
        if room_code.is_none() {
            room_code = Some(
                joined["room_code"]
                    .as_str()
                    .ok_or("room_joined without room_code")?
                    .to_string(),
            );
        }

        player_ids.push(player_id);
        clients.push(client);
    }

    // The fourth join triggers team assignment and the initial deal. Drain
    // each client to its turn prompt, keeping the hand it was dealt.
    let mut hands = Vec::new();
    for client in &mut clients {
        let mut hand = Vec::new();
        loop {
            let msg = client.recv_json().await?;
            match msg["type"].as_str() {
                Some("initial_deal") => hand = card_tokens(&msg["hand"])?,
                Some("turn_start") => break,
                _ => {}
            }
        }
        hands.push(hand);
    }

    Ok(Table {
        clients,
        player_ids,
        room_code: room_code.ok_or("no room code was assigned")?,
        hands,
    })
}

impl Table {
    /// Hakem picks the suit they hold most of and everyone drains to the
    /// post-deal turn prompt. Hands are refreshed from the final deal.
    pub async fn select_hokm_and_drain(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        let suit = dominant_suit(&self.hands[0]);
        self.clients[0].select_hokm(suit_name(suit)).await?;

        for (seat, client) in self.clients.iter_mut().enumerate() {
            loop {
                let msg = client.recv_json().await?;
                match msg["type"].as_str() {
                    Some("final_deal") => self.hands[seat] = card_tokens(&msg["hand"])?,
                    Some("turn_start") => break,
                    _ => {}
                }
            }
        }
        Ok(suit_name(suit).to_string())
    }
}

pub fn card_tokens(value: &Value) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    value
        .as_array()
        .map(|cards| {
            cards
                .iter()
                .filter_map(|card| card.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| "expected a card array".into())
}

/// Suit letter of a card token like "AS" or "TD".
pub fn suit_of(card: &str) -> char {
    card.chars().last().unwrap_or('?')
}

/// Suit the hand holds the most cards of.
pub fn dominant_suit(hand: &[String]) -> char {
    let mut best = 'S';
    let mut best_count = 0;
    for suit in ['S', 'H', 'D', 'C'] {
        let count = hand.iter().filter(|card| card.ends_with(suit)).count();
        if count > best_count {
            best = suit;
            best_count = count;
        }
    }
    best
}

pub fn suit_name(suit: char) -> &'static str {
    match suit {
        'S' => "spades",
        'H' => "hearts",
        'D' => "diamonds",
        _ => "clubs",
    }
}

/// Lowest-indexed card that follows the led suit, or any card when void.
pub fn pick_legal(hand: &[String], led: Option<char>) -> String {
    if let Some(led) = led {
        if let Some(card) = hand.iter().find(|card| card.ends_with(led)) {
            return card.clone();
        }
    }
    hand.first().cloned().unwrap_or_default()
}
