#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod identity;
pub mod room;
pub mod room_code;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;


// Re-exports for public API
pub use config::ServerConfig;
pub use error::AppError;
pub use identity::{DevIdentityProvider, IdentityProvider, PlayerIdentity};
pub use room::{RoomHandle, RoomManager};
pub use session::{ClientMsg, ServerMsg, SessionRegistry};
pub use state::AppState;
pub use store::{MemoryBackend, RedisBackend, ResilientStore, StoreBackend};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
