//! Unified test logging initialization for integration tests.
//!
//! Same initializer and env handling as the other apps: `TEST_LOG`, then
//! `RUST_LOG`, then quiet.

#[ctor::ctor]
fn _auto_init_for_integration_tests() {
    test_support::logging::init();
}
