//! Routing surface and operator admin.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::pool::{Instance, RouteTarget, Status};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub room_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RouteReply {
    pub instance_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_code: Option<String>,
}

/// Pick the instance a client should connect to.
///
/// With a room code: a standing affinity wins; on a miss the routable
/// instances are asked whether they hold the room live (a swept entry or a
/// balancer restart must not strand a running game), and only then is the
/// least-loaded healthy instance assigned and pinned. Without a code, just
/// the least-loaded pick; the room minted there gets pinned by the first
/// peer who routes with it.
async fn route(
    state: web::Data<AppState>,
    query: web::Query<RouteQuery>,
) -> Result<HttpResponse, AppError> {
    let code = query
        .room_code
        .as_deref()
        .map(canonical_code)
        .transpose()?;

    if let Some(code) = code.as_deref() {
        if let Some(target) = state.pool.affinity_target(code) {
            return Ok(reply(target, Some(code)));
        }
        if let Some(target) = find_resident(&state, code).await {
            info!(
                room_code = %code,
                instance_id = %target.instance_id,
                "[LB] re-pinned room to its resident instance"
            );
            let target = state.pool.pin(code, &target);
            return Ok(reply(target, Some(code)));
        }
    }

    let target = state
        .pool
        .assign()
        .ok_or_else(|| AppError::unavailable("no healthy instance available"))?;
    match code {
        Some(code) => {
            let target = state.pool.pin(&code, &target);
            info!(
                room_code = %code,
                instance_id = %target.instance_id,
                "[LB] pinned room"
            );
            Ok(reply(target, Some(&code)))
        }
        None => Ok(reply(target, None)),
    }
}

/// Ask the routable instances, in parallel, whether the room's task is live
/// in their process. Residency is exclusive so at most one answers 200.
async fn find_resident(state: &AppState, code: &str) -> Option<RouteTarget> {
    let timeout = state.config.probe.timeout;
    let checks: Vec<_> = state
        .pool
        .routable_targets()
        .into_iter()
        .map(|target| {
            let http = state.http.clone();
            let url = format!("{}/rooms/{}", target.address, code);
            async move {
                match http.get(&url).timeout(timeout).send().await {
                    Ok(response) if response.status().is_success() => Some(target),
                    _ => None,
                }
            }
        })
        .collect();
    futures::future::join_all(checks)
        .await
        .into_iter()
        .flatten()
        .next()
}

fn reply(target: RouteTarget, room_code: Option<&str>) -> HttpResponse {
    HttpResponse::Ok().json(RouteReply {
        instance_id: target.instance_id,
        address: target.address,
        room_code: room_code.map(str::to_string),
    })
}

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U

/// Canonicalize a room code exactly the way the instances do (Crockford
/// alphabet, O→0 and I/L→1 folds), so "abco23" and "ABC023" share one
/// affinity entry instead of splitting a table across instances.
fn canonical_code(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if !(4..=10).contains(&trimmed.len()) {
        return Err(AppError::bad_request(
            "INVALID_ROOM_CODE",
            format!("room code must be 4 to 10 characters, got {}", trimmed.len()),
        ));
    }
    let mut code = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let folded = match ch.to_ascii_uppercase() {
            'O' => '0',
            'I' | 'L' => '1',
            up => up,
        };
        if !CROCKFORD.contains(&(folded as u8)) {
            return Err(AppError::bad_request(
                "INVALID_ROOM_CODE",
                format!("room code contains invalid character {ch:?}"),
            ));
        }
        code.push(folded);
    }
    Ok(code)
}

#[derive(Debug, Serialize)]
pub struct InstanceReport {
    pub id: String,
    pub address: String,
    pub status: Status,
    pub draining: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub active_connections: usize,
    pub active_rooms: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<Instance> for InstanceReport {
    fn from(inst: Instance) -> Self {
        Self {
            status: inst.status(),
            draining: inst.is_draining(),
            id: inst.id,
            address: inst.address,
            consecutive_failures: inst.consecutive_failures,
            consecutive_successes: inst.consecutive_successes,
            active_connections: inst.active_connections,
            active_rooms: inst.active_rooms,
            reported_status: inst.reported_status,
            last_error: inst.last_error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstanceList {
    pub instances: Vec<InstanceReport>,
}

async fn instances(state: web::Data<AppState>) -> HttpResponse {
    let instances = state
        .pool
        .snapshot()
        .into_iter()
        .map(InstanceReport::from)
        .collect();
    HttpResponse::Ok().json(InstanceList { instances })
}

#[derive(Debug, Serialize)]
pub struct AdminReply {
    pub instance_id: String,
    pub status: Status,
}

async fn drain(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let status = state
        .pool
        .drain(&id)
        .ok_or_else(|| AppError::not_found("UNKNOWN_INSTANCE", format!("no instance {id}")))?;
    info!(instance_id = %id, "[LB] drain requested");
    Ok(HttpResponse::Ok().json(AdminReply {
        instance_id: id,
        status,
    }))
}

async fn undrain(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let status = state
        .pool
        .undrain(&id)
        .ok_or_else(|| AppError::not_found("UNKNOWN_INSTANCE", format!("no instance {id}")))?;
    info!(instance_id = %id, "[LB] undrain requested");
    Ok(HttpResponse::Ok().json(AdminReply {
        instance_id: id,
        status,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// "ok" while at least one instance is routable.
    pub status: &'static str,
    pub healthy_instances: usize,
    pub total_instances: usize,
    pub affinities: usize,
    pub uptime_secs: u64,
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let (healthy, total) = state.pool.counts();
    HttpResponse::Ok().json(HealthReport {
        status: if healthy > 0 { "ok" } else { "degraded" },
        healthy_instances: healthy,
        total_instances: total,
        affinities: state.pool.affinity_count(),
        uptime_secs: state.uptime().as_secs(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/route", web::get().to(route))
        .route("/instances", web::get().to(instances))
        .route("/admin/instances/{id}/drain", web::post().to(drain))
        .route("/admin/instances/{id}/undrain", web::post().to(undrain));
}
