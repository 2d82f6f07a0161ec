//! Health and residency endpoints consumed by the load balancer.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::error::AppError;
use crate::room_code;
use crate::state::AppState;
use crate::store::StoreHealth;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// "ok" or "degraded". Degraded instances stay routable; only an
    /// unreachable instance is pulled from rotation.
    pub status: &'static str,
    pub instance_id: String,
    pub active_connections: usize,
    pub active_rooms: usize,
    pub uptime_secs: u64,
    pub store: StoreHealth,
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let store = state.store.health();
    let status = if store.degraded { "degraded" } else { "ok" };
    HttpResponse::Ok().json(HealthReport {
        status,
        instance_id: state.config.instance_id.clone(),
        active_connections: state.registry.active_connections(),
        active_rooms: state.rooms.active_rooms(),
        uptime_secs: state.uptime().as_secs(),
        store,
    })
}

#[derive(Debug, Serialize)]
pub struct ResidencyReport {
    pub room_code: String,
    pub instance_id: String,
}

/// Answers for this process only. A room parked in the store is 404 here;
/// the store is a recovery path, and pinning affinity to it would split a
/// live room across instances.
async fn room_residency(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let code = path.into_inner();
    let code = room_code::normalize(&code)
        .map_err(|reason| AppError::bad_request("INVALID_ROOM_CODE", reason))?;
    if !state.rooms.is_resident(&code) {
        return Err(AppError::not_found(
            "ROOM_NOT_RESIDENT",
            format!("room {code} is not resident on this instance"),
        ));
    }
    Ok(HttpResponse::Ok().json(ResidencyReport {
        room_code: code,
        instance_id: state.config.instance_id.clone(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/rooms/{code}", web::get().to(room_residency));
}
