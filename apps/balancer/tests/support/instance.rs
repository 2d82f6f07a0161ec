//! Minimal stand-in for a game instance: just the surface the balancer
//! consumes (`/health`, `/rooms/{code}`), with knobs for load, failure,
//! and room residency.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer};
use balancer::InstanceSeed;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct MockState {
    id: String,
    failing: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    rooms: Arc<Mutex<HashSet<String>>>,
}

async fn health(state: web::Data<MockState>) -> HttpResponse {
    if state.failing.load(Ordering::SeqCst) {
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "instance_id": state.id,
        "active_connections": state.connections.load(Ordering::SeqCst),
        "active_rooms": state.rooms.lock().len(),
    }))
}

async fn residency(state: web::Data<MockState>, path: web::Path<String>) -> HttpResponse {
    let code = path.into_inner();
    if !state.failing.load(Ordering::SeqCst) && state.rooms.lock().contains(&code) {
        HttpResponse::Ok().json(serde_json::json!({
            "room_code": code,
            "instance_id": state.id,
        }))
    } else {
        HttpResponse::NotFound().finish()
    }
}

pub struct MockInstance {
    pub id: String,
    pub addr: SocketAddr,
    failing: Arc<AtomicBool>,
    connections: Arc<AtomicUsize>,
    rooms: Arc<Mutex<HashSet<String>>>,
    handle: ServerHandle,
    join: JoinHandle<Result<(), std::io::Error>>,
}

impl MockInstance {
    pub async fn start(id: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let state = MockState {
            id: id.to_string(),
            failing: Arc::new(AtomicBool::new(false)),
            connections: Arc::new(AtomicUsize::new(0)),
            rooms: Arc::new(Mutex::new(HashSet::new())),
        };

        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;

        let data = web::Data::new(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/health", web::get().to(health))
                .route("/rooms/{code}", web::get().to(residency))
        })
        .workers(1)
        .shutdown_timeout(1)
        .listen(listener)?
        .run();

        let handle = server.handle();
        let join = tokio::spawn(server);

        Ok(Self {
            id: id.to_string(),
            addr,
            failing: state.failing,
            connections: state.connections,
            rooms: state.rooms,
            handle,
            join,
        })
    }

    pub fn seed(&self) -> InstanceSeed {
        InstanceSeed {
            id: self.id.clone(),
            address: format!("http://{}", self.addr),
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Probes answer 500 while failing; residency goes dark too.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_connections(&self, n: usize) {
        self.connections.store(n, Ordering::SeqCst);
    }

    /// Pretend a live room task runs in this instance.
    pub fn host_room(&self, code: &str) {
        self.rooms.lock().insert(code.to_string());
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
        let _ = self.join.await;
    }
}
