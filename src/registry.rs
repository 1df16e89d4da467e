//! Room registry
//!
//! The roster of members who completed `EnterRoom`, in join order. Every
//! mutation and every broadcast runs under the same lock, so all members
//! observe joins, leaves and messages in one global order. Sending only
//! queues frames (see `SessionHandle::send`); the lock is never held across
//! a network write.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandKind};
use crate::session::SessionHandle;
use crate::time::{format_message, Clock, SystemClock};
use crate::types::{check_member_name, SessionId};

/// Result of `RoomRegistry::try_enter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterOutcome {
    Accepted,
    Rejected(String),
}

/// A registered member
#[derive(Debug)]
struct Member {
    name: String,
    session: SessionHandle,
}

#[derive(Debug, Default)]
struct Roster {
    members: Vec<Member>,
    /// Set while the server drains; late joiners are told right away
    draining: bool,
    /// Set once the server stopped; nobody may enter until it is reopened
    closed: bool,
}

impl Roster {
    fn position(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Send to every member. A failed send closes that session; its read
    /// loop then ends and removes it, so the rest of the fan-out goes on.
    fn broadcast(&self, command: &Command) {
        for member in &self.members {
            deliver(&member.session, &member.name, command.clone());
        }
    }
}

fn deliver(session: &SessionHandle, name: &str, command: Command) {
    if let Err(e) = session.send(command) {
        warn!(member = %name, session = %session.id(), "Dropping member after send error: {}", e);
        session.close();
    }
}

/// Shared roster of active members, keyed by display name
pub struct RoomRegistry {
    roster: Mutex<Roster>,
    clock: Arc<dyn Clock>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            roster: Mutex::new(Roster::default()),
            clock,
        }
    }

    /// Admit `name` for `session`, or reject it
    ///
    /// The `EnterRoomResponse` is queued to `session` here, under the lock,
    /// so it always precedes any broadcast the new member receives.
    /// Existing members get `MemberEntered` before the new member is added.
    pub fn try_enter(&self, name: &str, session: &SessionHandle) -> EnterOutcome {
        let mut roster = self.roster.lock();

        let verdict = check_member_name(name).and_then(|()| {
            if roster.closed {
                Err("server is not running.".to_string())
            } else if roster.position(name).is_some() {
                Err(format!("name '{}' already in chat.", name))
            } else if let Some(member) = roster.members.iter().find(|m| m.session.id() == session.id()) {
                Err(format!("already in chat as '{}'.", member.name))
            } else {
                Ok(())
            }
        });

        deliver(session, name, Command::enter_room_response(&verdict));

        if let Err(reason) = verdict {
            info!(session = %session.id(), "Rejected '{}': {}", name, reason);
            return EnterOutcome::Rejected(reason);
        }

        roster.broadcast(&Command::new(CommandKind::MemberEntered, name));
        roster.members.push(Member {
            name: name.to_string(),
            session: session.clone(),
        });
        if roster.draining {
            deliver(session, name, Command::empty(CommandKind::ServerDisconnecting));
        }

        info!(session = %session.id(), "'{}' entered the room ({} members)", name, roster.members.len());
        EnterOutcome::Accepted
    }

    /// Point-in-time copy of member names, in join order
    pub fn snapshot(&self) -> Vec<String> {
        self.roster
            .lock()
            .members
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    /// Complete the leave handshake for `name`
    ///
    /// Removes the member, sends `MemberLeft` to those remaining, then
    /// `MemberCanLeave` to the leaving session. Returns `false` (and does
    /// nothing) when `name` is not registered.
    pub fn leave(&self, name: &str) -> bool {
        let mut roster = self.roster.lock();
        let Some(index) = roster.position(name) else {
            debug!("Leave for unknown member '{}' ignored", name);
            return false;
        };

        let member = roster.members.remove(index);
        roster.broadcast(&Command::new(CommandKind::MemberLeft, name));
        deliver(
            &member.session,
            name,
            Command::new(CommandKind::MemberCanLeave, name),
        );

        info!(session = %member.session.id(), "'{}' left the room ({} members)", name, roster.members.len());
        true
    }

    /// Drop the member bound to `session` without a handshake
    ///
    /// Used when a connection ends abruptly. Remaining members get
    /// `MemberLeft`. Returns the removed name.
    pub fn remove_session(&self, session: SessionId) -> Option<String> {
        let mut roster = self.roster.lock();
        let index = roster
            .members
            .iter()
            .position(|m| m.session.id() == session)?;

        let member = roster.members.remove(index);
        roster.broadcast(&Command::new(CommandKind::MemberLeft, member.name.as_str()));

        info!(%session, "'{}' dropped from the room ({} members)", member.name, roster.members.len());
        Some(member.name)
    }

    /// Send `[HH:MM:SS] <sender> - <text>` to every member, sender included
    pub fn broadcast_message(&self, sender: &str, text: &str) {
        let roster = self.roster.lock();
        let line = format_message(self.clock.now(), sender, text);
        roster.broadcast(&Command::new(CommandKind::MessageReceived, line));
    }

    /// Tell every member the server is going down; nobody is removed here
    pub fn broadcast_server_disconnecting(&self) {
        let mut roster = self.roster.lock();
        roster.draining = true;
        roster.broadcast(&Command::empty(CommandKind::ServerDisconnecting));
        info!("Sent ServerDisconnecting to {} members", roster.members.len());
    }

    /// Accept entries again after `close`
    pub fn open(&self) {
        let mut roster = self.roster.lock();
        roster.closed = false;
        roster.draining = false;
    }

    /// Refuse every further entry
    pub fn close(&self) {
        let mut roster = self.roster.lock();
        roster.closed = true;
        roster.draining = false;
    }

    /// Close the room if nobody is left in it. Returns whether it closed.
    pub fn close_if_empty(&self) -> bool {
        let mut roster = self.roster.lock();
        if !roster.members.is_empty() {
            return false;
        }
        roster.closed = true;
        roster.draining = false;
        true
    }

    /// Remove and close every member without notifying anyone
    ///
    /// Last resort for a drain that timed out. Returns the evicted names.
    pub fn evict_all(&self) -> Vec<String> {
        let mut roster = self.roster.lock();
        roster
            .members
            .drain(..)
            .map(|member| {
                member.session.close();
                member.name
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.roster.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.lock().members.is_empty()
    }
}
