//! Basic type definitions for the chat room
//!
//! Provides:
//! - `SessionId`: UUID-based identifier for one accepted connection
//! - `ServerState`: lifecycle of the room server
//! - member name rules shared by the server and the client

use uuid::Uuid;

use crate::command::{DELIMITER, MEMBER_SEPARATOR};

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4. Two sessions may carry the same display name over
/// time, but never the same id, so roster cleanup keys on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room server lifecycle
///
/// `Stopped -> Running -> Draining -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
    Draining,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerState::Stopped => "stopped",
            ServerState::Running => "running",
            ServerState::Draining => "draining",
        };
        f.write_str(s)
    }
}

/// Check a display name before it enters the roster.
///
/// Returns the rejection text sent back in `EnterRoomResponse`.
pub fn check_member_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty.".to_string());
    }
    if name
        .chars()
        .any(|c| c == DELIMITER || c == MEMBER_SEPARATOR || c == '\n' || c == '\r')
    {
        return Err(format!(
            "name '{}' must not contain '{}', '{}' or line breaks.",
            name, DELIMITER, MEMBER_SEPARATOR
        ));
    }
    Ok(())
}
