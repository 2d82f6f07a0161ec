//! In-process server harness for the websocket suites.
//!
//! Each test gets its own listener on an ephemeral port and its own
//! `AppState`, so suites never share rooms or sessions. Failover tests pass
//! the same backend `Arc` to two harnesses to simulate shared Redis.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use tokio::task::JoinHandle;

use server::{routes, AppState, MemoryBackend, ServerConfig, StoreBackend};

pub struct TestServer {
    pub addr: SocketAddr,
    /// Direct handle to the instance state, for seeding stores and
    /// inspecting registries without going through the socket.
    pub state: web::Data<AppState>,
    handle: ServerHandle,
    join: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    /// Websocket URL carrying the dev-auth username.
    pub fn url(&self, username: &str) -> String {
        format!("ws://{}/ws?username={}", self.addr, username)
    }

    /// Graceful shutdown; waits for the server future to finish.
    pub async fn stop(self) {
        self.handle.stop(true).await;
        let _ = self.join.await;
    }

    /// Immediate shutdown, dropping live connections on the floor. This is
    /// the crash a failover test wants.
    pub async fn kill(self) {
        self.handle.stop(false).await;
        let _ = self.join.await;
    }
}

/// Config tuned so grace expiry and vacancy sweeps happen within a test's
/// patience instead of minutes.
pub fn fast_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.instance_id = "test-1".into();
    config.grace_period = Duration::from_millis(250);
    config.room_vacancy_ttl = Duration::from_secs(2);
    config
}

pub async fn start_test_server(
    config: ServerConfig,
    backend: Arc<dyn StoreBackend>,
) -> Result<TestServer, Box<dyn std::error::Error>> {
    let state = web::Data::new(AppState::new(config, backend));

    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .workers(1)
    // Open websockets otherwise hold a graceful stop for the full default
    // shutdown window.
    .shutdown_timeout(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    let join = tokio::spawn(server);

    Ok(TestServer {
        addr,
        state,
        handle,
        join,
    })
}

/// The common case: one instance over its own in-memory store.
pub async fn start_memory_server() -> Result<TestServer, Box<dyn std::error::Error>> {
    start_test_server(fast_config(), Arc::new(MemoryBackend::new())).await
}

/// Poll until the condition holds. Returns false on timeout.
pub async fn wait_until(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
