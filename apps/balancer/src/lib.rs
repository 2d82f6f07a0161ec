#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod config;
pub mod cors;
pub mod error;
pub mod pool;
pub mod prober;
pub mod routes;
pub mod state;

// Re-exports for public API
pub use config::BalancerConfig;
pub use error::AppError;
pub use pool::{Instance, InstancePool, InstanceSeed, RouteTarget, Status};
pub use prober::{ProbeConfig, Prober};
pub use state::AppState;

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_support::logging::init();
}
