pub mod game;
pub mod server;

// Re-export only what current tests actually import
pub use client::WsClient;
pub use game::{seat_four, Table};
pub use server::{fast_config, start_memory_server, start_test_server, wait_until, TestServer};
