//! The per-room task.
//!
//! Owns the `RoomState` and processes commands one at a time, so every
//! mutation, persist, and fanout for a room is serialized without locks.
//! Transient room concerns live here too: grace timers for disconnected
//! players, the vacancy clock, and throttled session flushes.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::domain::state::{SEATS, TEAMS};
use crate::domain::{engine, player_view, Card, GameEvent, Phase, RoomState, Seat, Suit};
use crate::room::manager::RoomManager;
use crate::room::{RoomCommand, RoomHandle};
use crate::session::registry::SessionRecord;
use crate::session::{ErrorCode, ServerMsg, SessionRegistry, SessionStatus};
use crate::store::{codec, ResilientStore};

/// Heartbeat touches persist the session record at most this often.
const SESSION_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

enum Tick {
    Cmd(Option<RoomCommand>),
    IdleDeadline,
}

pub(crate) struct RoomTask {
    state: RoomState,
    rx: mpsc::Receiver<RoomCommand>,
    handle: RoomHandle,
    manager: Arc<RoomManager>,
    store: Arc<ResilientStore>,
    registry: Arc<SessionRegistry>,
    config: Arc<ServerConfig>,
    /// Pending grace timers by player.
    grace: HashMap<Uuid, CancellationToken>,
    /// Players announced as disconnected and not yet back.
    away: HashSet<Uuid>,
    /// Last session flush per player, for heartbeat throttling.
    session_flush: HashMap<Uuid, std::time::Instant>,
    /// Armed while no seated player is connected to this instance.
    idle_deadline: Option<tokio::time::Instant>,
}

impl RoomTask {
    pub(crate) fn new(
        state: RoomState,
        rx: mpsc::Receiver<RoomCommand>,
        handle: RoomHandle,
        manager: Arc<RoomManager>,
        store: Arc<ResilientStore>,
        registry: Arc<SessionRegistry>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            state,
            rx,
            handle,
            manager,
            store,
            registry,
            config,
            grace: HashMap::new(),
            away: HashSet::new(),
            session_flush: HashMap::new(),
            idle_deadline: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            room_code = %self.state.room_code,
            phase = %self.state.phase,
            "[ROOM] task started"
        );
        self.on_start();
        loop {
            let tick = match self.idle_deadline {
                Some(deadline) => tokio::select! {
                    cmd = self.rx.recv() => Tick::Cmd(cmd),
                    _ = tokio::time::sleep_until(deadline) => Tick::IdleDeadline,
                },
                None => Tick::Cmd(self.rx.recv().await),
            };
            match tick {
                Tick::IdleDeadline => {
                    if self.any_connected() {
                        self.idle_deadline = None;
                        continue;
                    }
                    info!(
                        room_code = %self.state.room_code,
                        "[ROOM] vacant past ttl, parking"
                    );
                    break;
                }
                Tick::Cmd(None) => break,
                Tick::Cmd(Some(cmd)) => {
                    if self.handle_cmd(cmd).await.is_break() {
                        return;
                    }
                }
            }
        }
        self.manager.remove_resident(&self.state.room_code);
        info!(room_code = %self.state.room_code, "[ROOM] task stopped");
    }

    /// Adoption: seated players without a live connection here get a grace
    /// timer, exactly as if they had just dropped. Covers failover, where
    /// the previous instance died with connections open.
    fn on_start(&mut self) {
        let seated: Vec<Uuid> = self
            .state
            .slots
            .iter()
            .flatten()
            .map(|occupant| occupant.player_id)
            .collect();
        for player_id in seated {
            if !self.is_connected(player_id) {
                self.away.insert(player_id);
                self.start_grace(player_id);
            }
        }
        if let Some(reason) = &self.state.fault {
            warn!(
                room_code = %self.state.room_code,
                reason = %reason,
                "[ROOM] resident in quarantine"
            );
        }
        self.refresh_idle();
    }

    async fn handle_cmd(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        let flow = self.dispatch(cmd).await;
        if flow.is_continue() {
            self.refresh_idle();
        }
        flow
    }

    async fn dispatch(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Join {
                player_id,
                username,
            } => self.on_join(player_id, &username).await,
            RoomCommand::Reconnect { player_id } => self.on_reconnect(player_id).await,
            RoomCommand::SelectHokm { player_id, suit } => {
                self.on_select_hokm(player_id, suit).await
            }
            RoomCommand::PlayCard { player_id, card } => self.on_play_card(player_id, card).await,
            RoomCommand::Leave { player_id } => self.on_leave(player_id).await,
            RoomCommand::ConnectionDropped { player_id } => self.on_dropped(player_id).await,
            RoomCommand::GraceExpired { player_id } => self.on_grace_expired(player_id).await,
            RoomCommand::Touch { player_id } => self.on_touch(player_id).await,
        }
    }

    async fn on_join(&mut self, player_id: Uuid, username: &str) -> ControlFlow<()> {
        if let Some(reason) = self.state.fault.clone() {
            self.registry
                .push_to(player_id, ServerMsg::error(ErrorCode::RoomQuarantined, reason));
            return ControlFlow::Continue(());
        }
        let events = match engine::join(&mut self.state, player_id, username) {
            Ok(events) => events,
            Err(err) => {
                self.registry.push_to(player_id, ServerMsg::rules_error(&err));
                return ControlFlow::Continue(());
            }
        };
        let Some(seat) = self.state.seat_of(player_id) else {
            return ControlFlow::Continue(());
        };
        let was_away = self.away.remove(&player_id);
        self.cancel_grace(player_id);
        self.registry.bind_room(player_id, &self.state.room_code);
        self.persist_room().await;
        self.persist_session(player_id).await;

        self.registry.push_to(
            player_id,
            ServerMsg::RoomJoined {
                room_code: self.state.room_code.clone(),
                seat,
                game_state: player_view(&self.state, seat),
            },
        );
        if was_away {
            self.broadcast_except(seat, ServerMsg::PlayerReconnected { seat });
        }
        for event in &events {
            if let GameEvent::PlayerJoined { seat, username } = event {
                self.broadcast_except(
                    *seat,
                    ServerMsg::PlayerJoined {
                        seat: *seat,
                        username: username.clone(),
                    },
                );
            } else {
                self.fan_out_one(event);
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_reconnect(&mut self, player_id: Uuid) -> ControlFlow<()> {
        if let Some(reason) = self.state.fault.clone() {
            self.registry
                .push_to(player_id, ServerMsg::error(ErrorCode::RoomQuarantined, reason));
            return ControlFlow::Continue(());
        }
        let Some(seat) = self.state.seat_of(player_id) else {
            self.registry.push_to(
                player_id,
                ServerMsg::error(
                    ErrorCode::GraceExpired,
                    "seat was released after the reconnection grace period",
                ),
            );
            return ControlFlow::Continue(());
        };
        let was_away = self.away.remove(&player_id);
        self.cancel_grace(player_id);
        self.registry.bind_room(player_id, &self.state.room_code);
        self.persist_session(player_id).await;

        self.registry.push_to(
            player_id,
            ServerMsg::ReconnectSuccess {
                game_state: player_view(&self.state, seat),
            },
        );
        if was_away {
            self.broadcast_except(seat, ServerMsg::PlayerReconnected { seat });
        }
        // Re-prompt so a client that acts on turn_start instead of the view
        // does not stall the table.
        if self.state.turn == Some(seat) {
            self.push_seat(
                seat,
                ServerMsg::TurnStart {
                    current_player: seat,
                    your_turn: true,
                },
            );
        }
        info!(
            room_code = %self.state.room_code,
            player_id = %player_id,
            seat,
            "[ROOM] player reconnected"
        );
        ControlFlow::Continue(())
    }

    async fn on_select_hokm(&mut self, player_id: Uuid, suit: Suit) -> ControlFlow<()> {
        if let Some(reason) = self.state.fault.clone() {
            self.registry
                .push_to(player_id, ServerMsg::error(ErrorCode::RoomQuarantined, reason));
            return ControlFlow::Continue(());
        }
        let Some(seat) = self.state.seat_of(player_id) else {
            self.registry.push_to(
                player_id,
                ServerMsg::error(ErrorCode::NotInRoom, "join a room first"),
            );
            return ControlFlow::Continue(());
        };
        match engine::select_hokm(&mut self.state, seat, suit) {
            Err(err) => {
                self.registry.push_to(player_id, ServerMsg::rules_error(&err));
            }
            Ok(events) => {
                self.persist_room().await;
                self.fan_out(&events);
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_play_card(&mut self, player_id: Uuid, card: Card) -> ControlFlow<()> {
        if let Some(reason) = self.state.fault.clone() {
            self.registry
                .push_to(player_id, ServerMsg::error(ErrorCode::RoomQuarantined, reason));
            return ControlFlow::Continue(());
        }
        let Some(seat) = self.state.seat_of(player_id) else {
            self.registry.push_to(
                player_id,
                ServerMsg::error(ErrorCode::NotInRoom, "join a room first"),
            );
            return ControlFlow::Continue(());
        };
        match engine::play_card(&mut self.state, seat, card) {
            Err(err) => {
                self.registry.push_to(player_id, ServerMsg::rules_error(&err));
            }
            Ok(events) => {
                self.persist_room().await;
                self.fan_out(&events);
                if self.state.phase == Phase::GameOver && self.state.fault.is_none() {
                    return self.finish_game().await;
                }
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_leave(&mut self, player_id: Uuid) -> ControlFlow<()> {
        self.away.remove(&player_id);
        self.cancel_grace(player_id);
        self.session_flush.remove(&player_id);
        if self.state.fault.is_some() {
            self.registry.unbind_room(player_id);
            self.persist_session(player_id).await;
            self.registry.push_to(player_id, ServerMsg::RoomLeft);
            return ControlFlow::Continue(());
        }
        match engine::vacate(&mut self.state, player_id) {
            Err(_) => {
                self.registry.push_to(
                    player_id,
                    ServerMsg::error(ErrorCode::NotInRoom, "not seated in this room"),
                );
            }
            Ok(events) => {
                self.registry.unbind_room(player_id);
                self.persist_room().await;
                self.persist_session(player_id).await;
                self.registry.push_to(player_id, ServerMsg::RoomLeft);
                self.fan_out(&events);
                info!(
                    room_code = %self.state.room_code,
                    player_id = %player_id,
                    "[ROOM] player left"
                );
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_dropped(&mut self, player_id: Uuid) -> ControlFlow<()> {
        let Some(seat) = self.state.seat_of(player_id) else {
            return ControlFlow::Continue(());
        };
        // A reconnect or takeover may already have landed.
        if self.is_connected(player_id) {
            return ControlFlow::Continue(());
        }
        info!(
            room_code = %self.state.room_code,
            player_id = %player_id,
            seat,
            grace_secs = self.config.grace_period.as_secs(),
            "[ROOM] player disconnected, holding seat"
        );
        self.persist_session(player_id).await;
        self.away.insert(player_id);
        self.start_grace(player_id);
        self.broadcast_except(seat, ServerMsg::PlayerDisconnected { seat });
        ControlFlow::Continue(())
    }

    async fn on_grace_expired(&mut self, player_id: Uuid) -> ControlFlow<()> {
        if self.grace.remove(&player_id).is_none() {
            return ControlFlow::Continue(());
        }
        if self.is_connected(player_id) {
            return ControlFlow::Continue(());
        }
        let Some(seat) = self.state.seat_of(player_id) else {
            return ControlFlow::Continue(());
        };
        let Some(username) = self
            .state
            .occupant(seat)
            .map(|occupant| occupant.username.clone())
        else {
            return ControlFlow::Continue(());
        };
        info!(
            room_code = %self.state.room_code,
            player_id = %player_id,
            seat,
            "[ROOM] grace expired, releasing seat"
        );
        self.away.remove(&player_id);
        self.session_flush.remove(&player_id);
        match engine::vacate(&mut self.state, player_id) {
            Err(_) => {}
            Ok(events) => {
                let _ = self.registry.expire_binding(player_id);
                self.persist_room().await;
                self.persist_session_cleared(player_id, &username).await;
                self.fan_out(&events);
            }
        }
        ControlFlow::Continue(())
    }

    async fn on_touch(&mut self, player_id: Uuid) -> ControlFlow<()> {
        let now = std::time::Instant::now();
        let due = self
            .session_flush
            .get(&player_id)
            .is_none_or(|last| now.duration_since(*last) >= SESSION_FLUSH_INTERVAL);
        if due {
            self.session_flush.insert(player_id, now);
            self.persist_session(player_id).await;
        }
        ControlFlow::Continue(())
    }

    /// Game over: clear bindings, drop the store key, remember the code.
    async fn finish_game(&mut self) -> ControlFlow<()> {
        info!(room_code = %self.state.room_code, "[ROOM] game complete, closing");
        let occupants: Vec<(Uuid, String)> = self
            .state
            .slots
            .iter()
            .flatten()
            .map(|occupant| (occupant.player_id, occupant.username.clone()))
            .collect();
        for (player_id, username) in occupants {
            self.registry.unbind_room(player_id);
            self.persist_session_cleared(player_id, &username).await;
        }
        if let Err(err) = self
            .store
            .delete(&codec::room_key(&self.state.room_code))
            .await
        {
            // the key still carries a ttl, so it gets reaped eventually
            warn!(
                room_code = %self.state.room_code,
                error = %err,
                "[ROOM] failed to delete completed room state"
            );
        }
        self.manager.archive(&self.state.room_code);
        ControlFlow::Break(())
    }

    fn start_grace(&mut self, player_id: Uuid) {
        if self.grace.contains_key(&player_id) {
            return;
        }
        let token = CancellationToken::new();
        self.grace.insert(player_id, token.clone());
        let tx = self.handle.sender();
        let grace = self.config.grace_period;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    let _ = tx.send(RoomCommand::GraceExpired { player_id }).await;
                }
            }
        });
    }

    fn cancel_grace(&mut self, player_id: Uuid) -> bool {
        match self.grace.remove(&player_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn is_connected(&self, player_id: Uuid) -> bool {
        self.registry
            .snapshot(player_id)
            .is_some_and(|record| record.status == SessionStatus::Connected)
    }

    fn any_connected(&self) -> bool {
        self.state
            .slots
            .iter()
            .flatten()
            .any(|occupant| self.is_connected(occupant.player_id))
    }

    fn refresh_idle(&mut self) {
        if self.any_connected() {
            self.idle_deadline = None;
        } else if self.idle_deadline.is_none() {
            self.idle_deadline =
                Some(tokio::time::Instant::now() + self.config.room_vacancy_ttl);
        }
    }

    async fn persist_room(&self) {
        let fields = codec::room_to_fields(&self.state);
        if let Err(err) = self
            .store
            .save(
                &codec::room_key(&self.state.room_code),
                fields,
                self.config.room_state_ttl,
            )
            .await
        {
            warn!(
                room_code = %self.state.room_code,
                error = %err,
                "[ROOM] state persist failed, continuing from memory"
            );
        }
    }

    async fn persist_session(&self, player_id: Uuid) {
        let Some(record) = self.registry.snapshot(player_id) else {
            return;
        };
        self.save_session(player_id, &record).await;
    }

    /// Persist a cleared binding even when the player's session lives on
    /// another instance and this registry has no entry for it.
    async fn persist_session_cleared(&self, player_id: Uuid, username: &str) {
        let record = self
            .registry
            .snapshot(player_id)
            .unwrap_or_else(|| SessionRecord {
                username: username.to_string(),
                room_code: None,
                status: SessionStatus::Disconnected,
                last_heartbeat: OffsetDateTime::now_utc(),
            });
        self.save_session(player_id, &record).await;
    }

    async fn save_session(&self, player_id: Uuid, record: &SessionRecord) {
        if let Err(err) = self
            .store
            .save(
                &codec::session_key(player_id),
                record.to_fields(),
                self.config.session_ttl,
            )
            .await
        {
            warn!(
                player_id = %player_id,
                error = %err,
                "[ROOM] session persist failed"
            );
        }
    }

    fn fan_out(&self, events: &[GameEvent]) {
        for event in events {
            self.fan_out_one(event);
        }
    }

    fn fan_out_one(&self, event: &GameEvent) {
        match event {
            GameEvent::PlayerJoined { seat, username } => self.broadcast(ServerMsg::PlayerJoined {
                seat: *seat,
                username: username.clone(),
            }),
            GameEvent::PlayerLeft { seat, username } => self.broadcast(ServerMsg::PlayerLeft {
                seat: *seat,
                username: username.clone(),
            }),
            GameEvent::TeamsAssigned { hakem } => self.broadcast(ServerMsg::TeamAssignment {
                teams: TEAMS,
                hakem: *hakem,
            }),
            GameEvent::InitialDealDealt | GameEvent::FinalDealDealt => {
                let final_deal = matches!(event, GameEvent::FinalDealDealt);
                for seat in 0..SEATS as Seat {
                    let hand = self.state.hands[seat as usize].clone();
                    let msg = if final_deal {
                        ServerMsg::FinalDeal { hand }
                    } else {
                        ServerMsg::InitialDeal { hand }
                    };
                    self.push_seat(seat, msg);
                }
            }
            GameEvent::HokmSelected { suit } => {
                self.broadcast(ServerMsg::HokmSelected { suit: *suit })
            }
            GameEvent::TurnStarted { seat } => {
                for at in 0..SEATS as Seat {
                    self.push_seat(
                        at,
                        ServerMsg::TurnStart {
                            current_player: *seat,
                            your_turn: at == *seat,
                        },
                    );
                }
            }
            GameEvent::CardPlayed { seat, card } => self.broadcast(ServerMsg::CardPlayed {
                player: *seat,
                card: *card,
            }),
            GameEvent::TrickResolved {
                winner,
                trick_counts,
            } => self.broadcast(ServerMsg::TrickResult {
                winner: *winner,
                tricks: *trick_counts,
            }),
            GameEvent::HandCompleted {
                winning_team,
                trick_counts,
                hand_wins,
                game_complete,
            } => self.broadcast(ServerMsg::HandComplete {
                winning_team: *winning_team,
                tricks: *trick_counts,
                round_scores: *hand_wins,
                game_complete: *game_complete,
            }),
            GameEvent::GameQuarantined { reason } => self.broadcast(ServerMsg::error(
                ErrorCode::RoomQuarantined,
                reason.clone(),
            )),
        }
    }

    fn broadcast(&self, msg: ServerMsg) {
        for occupant in self.state.slots.iter().flatten() {
            self.registry.push_to(occupant.player_id, msg.clone());
        }
    }

    fn broadcast_except(&self, seat: Seat, msg: ServerMsg) {
        for (at, slot) in self.state.slots.iter().enumerate() {
            if at as Seat == seat {
                continue;
            }
            if let Some(occupant) = slot {
                self.registry.push_to(occupant.player_id, msg.clone());
            }
        }
    }

    fn push_seat(&self, seat: Seat, msg: ServerMsg) {
        if let Some(occupant) = self.state.occupant(seat) {
            self.registry.push_to(occupant.player_id, msg);
        }
    }
}
