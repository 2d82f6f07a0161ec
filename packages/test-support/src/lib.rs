//! Shared test support utilities
//!
//! This crate provides unique test data generation (ULID-backed, so parallel
//! test runs never collide) and unified logging initialization for unit and
//! integration tests.

pub mod logging;
pub mod unique;

pub use unique::{unique_room_code, unique_username};
