//! The per-connection WebSocket actor.
//!
//! Thin by design: parse frames, resolve rooms, forward commands. Game
//! replies and broadcasts arrive through the registry as [`SessionPush`]
//! messages; the actor just serializes them onto the socket. Losing the
//! socket never loses the seat, the room task's grace timer does that.

use std::time::Instant;

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::Credentials;
use crate::room::{RoomAccessError, RoomCommand, RoomHandle};
use crate::session::protocol::{ClientMsg, ErrorCode, ServerMsg};
use crate::session::registry::{ConnHandle, ConnectError, SessionPush, SessionRecord, Shutdown};
use crate::state::AppState;
use crate::store::codec;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub username: String,
}

/// GET /ws?username=... authenticates, then hands the socket to the actor.
pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let credentials = Credentials {
        username: query.into_inner().username,
    };
    let identity = app_state
        .identity
        .authenticate(&credentials)
        .await
        .map_err(AppError::from)?;
    let session = WsSession::new(identity, app_state);
    ws::start(session, &req, stream)
}

pub struct WsSession {
    conn_id: Uuid,
    identity: crate::identity::PlayerIdentity,
    state: web::Data<AppState>,
    /// Set once a join or reconnect resolves.
    room: Option<RoomHandle>,
    last_heartbeat: Instant,
    heartbeat_handle: Option<actix::SpawnHandle>,
}

impl WsSession {
    fn new(identity: crate::identity::PlayerIdentity, state: web::Data<AppState>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            identity,
            state,
            room: None,
            last_heartbeat: Instant::now(),
            heartbeat_handle: None,
        }
    }

    fn send_json(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(payload) => ctx.text(payload),
            Err(err) => warn!(error = %err, "[WS] failed to serialize outbound message"),
        }
    }

    fn send_error_and_close(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        Self::send_json(ctx, &ServerMsg::error(code, message));
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
        ctx.stop();
    }

    fn start_heartbeat(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let interval = self.state.config.heartbeat_interval;
        let timeout = self.state.config.client_timeout();
        let handle = ctx.run_interval(interval, move |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > timeout {
                warn!(
                    conn_id = %actor.conn_id,
                    player_id = %actor.identity.player_id,
                    "[WS] heartbeat timed out"
                );
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
        });
        self.heartbeat_handle = Some(handle);
    }

    fn touch(&mut self) {
        self.last_heartbeat = Instant::now();
        self.state.registry.touch(self.identity.player_id);
        if let Some(room) = &self.room {
            room.notify(RoomCommand::Touch {
                player_id: self.identity.player_id,
            });
        }
    }

    fn handle_msg(&mut self, cmd: ClientMsg, ctx: &mut ws::WebsocketContext<Self>) {
        let player_id = self.identity.player_id;
        match cmd {
            ClientMsg::Join { room_code } => self.handle_join(room_code, ctx),
            ClientMsg::Reconnect { player_id: claimed } => self.handle_reconnect(claimed, ctx),
            ClientMsg::SelectHokm { suit } => {
                self.forward(RoomCommand::SelectHokm { player_id, suit }, ctx)
            }
            ClientMsg::PlayCard { card } => {
                self.forward(RoomCommand::PlayCard { player_id, card }, ctx)
            }
            ClientMsg::Leave => self.forward(RoomCommand::Leave { player_id }, ctx),
        }
    }

    fn handle_join(&mut self, room_code: Option<String>, ctx: &mut ws::WebsocketContext<Self>) {
        if self.room.is_some() {
            Self::send_json(
                ctx,
                &ServerMsg::error(ErrorCode::BadRequest, "leave your current room first"),
            );
            return;
        }
        let state = self.state.clone();
        let player_id = self.identity.player_id;
        let username = self.identity.username.clone();
        // ctx.wait defers later frames until the join resolves, so a second
        // join sent in the same breath hits the room guard instead of racing
        // this one into a second seat.
        ctx.wait(
            async move {
                let handle = match room_code {
                    None => state.rooms.create().await.map_err(access_error)?,
                    Some(raw) => {
                        let code = crate::room_code::normalize(&raw)
                            .map_err(|detail| (ErrorCode::BadRequest, detail))?;
                        state.rooms.lookup(&code).await.map_err(access_error)?
                    }
                };
                handle
                    .command(RoomCommand::Join {
                        player_id,
                        username,
                    })
                    .await
                    .map_err(room_closed)?;
                Ok::<RoomHandle, (ErrorCode, String)>(handle)
            }
            .into_actor(self)
            .map(|res, actor, ctx| match res {
                Ok(handle) => actor.room = Some(handle),
                Err((code, message)) => Self::send_json(ctx, &ServerMsg::error(code, message)),
            }),
        );
    }

    fn handle_reconnect(&mut self, claimed: Uuid, ctx: &mut ws::WebsocketContext<Self>) {
        if claimed != self.identity.player_id {
            // The durable id is bound to the username-derived identity; a
            // mismatched claim is a different player's id.
            Self::send_json(
                ctx,
                &ServerMsg::error(
                    ErrorCode::IdentityMismatch,
                    "player_id does not belong to this connection's identity",
                ),
            );
            return;
        }
        let state = self.state.clone();
        let player_id = self.identity.player_id;
        // Same deferral as join: nothing else may touch actor.room while the
        // binding is being resolved.
        ctx.wait(
            async move {
                let room_code = match state.registry.room_of(player_id) {
                    Some(code) => Some(code),
                    None => stored_binding(&state, player_id).await?,
                };
                let Some(code) = room_code else {
                    if let Some(room) = state.registry.tombstoned_room(player_id) {
                        return Err((
                            ErrorCode::GraceExpired,
                            format!("seat in room {room} was released"),
                        ));
                    }
                    return Err((
                        ErrorCode::SessionNotFound,
                        "no session to resume, join instead".to_string(),
                    ));
                };
                let handle = state.rooms.lookup(&code).await.map_err(access_error)?;
                handle
                    .command(RoomCommand::Reconnect { player_id })
                    .await
                    .map_err(room_closed)?;
                Ok::<RoomHandle, (ErrorCode, String)>(handle)
            }
            .into_actor(self)
            .map(|res, actor, ctx| match res {
                Ok(handle) => actor.room = Some(handle),
                Err((code, message)) => Self::send_json(ctx, &ServerMsg::error(code, message)),
            }),
        );
    }

    fn forward(&mut self, cmd: RoomCommand, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(room) = self.room.clone() else {
            Self::send_json(
                ctx,
                &ServerMsg::error(ErrorCode::NotInRoom, "join a room first"),
            );
            return;
        };
        let leaving = matches!(cmd, RoomCommand::Leave { .. });
        ctx.spawn(
            async move { room.command(cmd).await }.into_actor(self).map(
                move |res, actor, ctx| match res {
                    Ok(()) => {
                        if leaving {
                            actor.room = None;
                        }
                    }
                    Err(_) => {
                        actor.room = None;
                        Self::send_json(
                            ctx,
                            &ServerMsg::error(ErrorCode::RoomNotFound, "room is no longer live"),
                        );
                    }
                },
            ),
        );
    }
}

fn access_error(err: RoomAccessError) -> (ErrorCode, String) {
    match err {
        RoomAccessError::NotFound => (ErrorCode::RoomNotFound, "no such room".to_string()),
        RoomAccessError::Completed => {
            (ErrorCode::RoomNotFound, "game already completed".to_string())
        }
        RoomAccessError::Unavailable => (
            ErrorCode::ServiceUnavailable,
            "state store unavailable, try again".to_string(),
        ),
    }
}

fn room_closed<E>(_: E) -> (ErrorCode, String) {
    (
        ErrorCode::ServiceUnavailable,
        "room is not accepting commands, try again".to_string(),
    )
}

/// Resolve a player's room binding from the stored session record.
async fn stored_binding(
    state: &AppState,
    player_id: Uuid,
) -> Result<Option<String>, (ErrorCode, String)> {
    match state.store.load(&codec::session_key(player_id)).await {
        Ok(Some(loaded)) => match SessionRecord::from_fields(&loaded.fields) {
            Ok(record) => Ok(record.room_code),
            Err(err) => {
                warn!(
                    player_id = %player_id,
                    error = %err,
                    "[WS] stored session record is corrupt, treating as absent"
                );
                Ok(None)
            }
        },
        Ok(None) => Ok(None),
        Err(err) => {
            warn!(player_id = %player_id, error = %err, "[WS] session lookup failed");
            Err((
                ErrorCode::ServiceUnavailable,
                "session store unavailable, try again".to_string(),
            ))
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let conn = ConnHandle {
            conn_id: self.conn_id,
            push: ctx.address().recipient::<SessionPush>(),
            control: ctx.address().recipient::<Shutdown>(),
        };
        match self.state.registry.connect(&self.identity, conn) {
            Ok(_) => {
                info!(
                    conn_id = %self.conn_id,
                    player_id = %self.identity.player_id,
                    username = %self.identity.username,
                    "[WS] session started"
                );
                Self::send_json(
                    ctx,
                    &ServerMsg::Welcome {
                        player_id: self.identity.player_id,
                        username: self.identity.username.clone(),
                    },
                );
                self.start_heartbeat(ctx);
            }
            Err(ConnectError::AlreadyConnected) => {
                self.send_error_and_close(
                    ctx,
                    ErrorCode::AlreadyConnected,
                    "player already has a live connection",
                );
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let transitioned = self
            .state
            .registry
            .mark_disconnected(self.identity.player_id, self.conn_id);
        info!(
            conn_id = %self.conn_id,
            player_id = %self.identity.player_id,
            "[WS] session stopped"
        );
        if !transitioned {
            return;
        }
        if let Some(room) = self.room.take() {
            let player_id = self.identity.player_id;
            let tx = room.sender();
            tokio::spawn(async move {
                let _ = tx.send(RoomCommand::ConnectionDropped { player_id }).await;
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.touch();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.touch();
            }
            Ok(ws::Message::Text(text)) => {
                self.touch();
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(cmd) => self.handle_msg(cmd, ctx),
                    Err(err) => {
                        // Malformed input is the client's problem, not the
                        // session's; answer and keep the socket open.
                        Self::send_json(
                            ctx,
                            &ServerMsg::error(
                                ErrorCode::BadRequest,
                                format!("malformed message: {err}"),
                            ),
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.touch();
                Self::send_json(
                    ctx,
                    &ServerMsg::error(ErrorCode::BadRequest, "binary frames not supported"),
                );
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(
                    conn_id = %self.conn_id,
                    player_id = %self.identity.player_id,
                    error = %err,
                    "[WS] protocol error"
                );
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                ctx.stop();
            }
        }
    }
}

impl Handler<SessionPush> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: SessionPush, ctx: &mut Self::Context) -> Self::Result {
        Self::send_json(ctx, &msg.0);
    }
}

impl Handler<Shutdown> for WsSession {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        info!(
            conn_id = %self.conn_id,
            player_id = %self.identity.player_id,
            "[WS] replaced by a newer connection"
        );
        if let Some(handle) = self.heartbeat_handle.take() {
            ctx.cancel_future(handle);
        }
        ctx.stop();
    }
}
