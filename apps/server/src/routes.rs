use actix_web::web;

use crate::session::ws;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(crate::health::configure)
        .route("/ws", web::get().to(ws::upgrade));
}
