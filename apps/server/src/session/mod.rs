//! WebSocket sessions: wire protocol, per-connection actors, and the
//! registry that enforces the single-session rule.

pub mod protocol;
pub mod registry;
pub mod ws;

pub use protocol::{ClientMsg, ErrorCode, ServerMsg};
pub use registry::{ConnHandle, SessionRegistry, SessionStatus};
