//! Test helpers for generating unique test data
//!
//! ULIDs keep generated values unique across threads and test runs so tests
//! never conflict on shared state (usernames, room codes).

use ulid::Ulid;

/// Generate a unique username that passes server-side validation
/// (alphanumeric plus `-`/`_`, bounded length).
///
/// # Examples
/// ```
/// use test_support::unique_username;
///
/// let a = unique_username("p");
/// let b = unique_username("p");
/// assert_ne!(a, b);
/// ```
pub fn unique_username(prefix: &str) -> String {
    // ULIDs are 26 chars; keep the whole thing under typical length caps.
    let ulid = Ulid::new().to_string();
    format!("{}-{}", prefix, &ulid[ulid.len() - 10..])
}

/// Generate a unique room-code-shaped string (uppercase alphanumeric).
///
/// Useful when a test needs a code that will not collide with codes minted
/// by the server under test.
pub fn unique_room_code() -> String {
    let ulid = Ulid::new().to_string();
    ulid[ulid.len() - 6..].to_uppercase()
}
