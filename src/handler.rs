//! Server-side command handler
//!
//! Binds a session's inbound `EnterRoom`, `GetMembers`, `SendMessage` and
//! `MemberLeaving` commands to room registry operations.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::command::{Command, CommandKind};
use crate::registry::{EnterOutcome, RoomRegistry};
use crate::session::{CloseReason, CommandHandler, Flow, Session};

/// Handler shared by every server session
pub struct RoomHandler {
    registry: Arc<RoomRegistry>,
}

impl RoomHandler {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    fn handle_enter_room(&self, session: &mut Session, name: String) -> Flow {
        if let Some(current) = session.name() {
            warn!(session = %session.id(), "'{}' sent EnterRoom again as '{}'", current, name);
            let reason = format!("already in chat as '{}'.", current);
            let _ = session.send(Command::enter_room_response(&Err(reason)));
            return Flow::Continue;
        }

        match self.registry.try_enter(&name, session.handle()) {
            EnterOutcome::Accepted => {
                session.set_name(name);
                Flow::Continue
            }
            // The rejected client is expected to hang up; stop reading.
            EnterOutcome::Rejected(_) => Flow::Stop,
        }
    }

    fn handle_get_members(&self, session: &Session) -> Flow {
        let names = self.registry.snapshot();
        let _ = session.send(Command::get_members_response(&names));
        Flow::Continue
    }

    fn handle_send_message(&self, session: &Session, text: String) -> Flow {
        match session.name() {
            Some(name) => self.registry.broadcast_message(name, &text),
            None => debug!(session = %session.id(), "SendMessage before EnterRoom ignored"),
        }
        Flow::Continue
    }

    fn handle_member_leaving(&self, session: &Session, claimed: String) -> Flow {
        let Some(name) = session.name() else {
            // Never entered: nothing to remove, just release the client.
            let _ = session.send(Command::new(CommandKind::MemberCanLeave, claimed));
            return Flow::Stop;
        };

        if claimed != name {
            warn!(session = %session.id(), "MemberLeaving for '{}' from '{}'", claimed, name);
        }
        if !self.registry.leave(name) {
            let _ = session.send(Command::new(CommandKind::MemberCanLeave, name));
        }
        Flow::Stop
    }
}

impl CommandHandler for RoomHandler {
    fn handle(&self, session: &mut Session, command: Command) -> Flow {
        match command.kind {
            CommandKind::EnterRoom => self.handle_enter_room(session, command.payload),
            CommandKind::GetMembers => self.handle_get_members(session),
            CommandKind::SendMessage => self.handle_send_message(session, command.payload),
            CommandKind::MemberLeaving => self.handle_member_leaving(session, command.payload),
            kind => {
                debug!(session = %session.id(), "Ignoring {} from client", kind);
                Flow::Continue
            }
        }
    }

    fn closed(&self, session: &Session, reason: &CloseReason) {
        if let Some(name) = self.registry.remove_session(session.id()) {
            info!(session = %session.id(), ?reason, "'{}' disconnected without leaving", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CommandCodec;
    use crate::config::SessionLimits;
    use crate::session::Connection;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{duplex, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio_util::codec::Framed;

    fn spawn_session(
        registry: &Arc<RoomRegistry>,
    ) -> (Framed<DuplexStream, CommandCodec>, JoinHandle<CloseReason>) {
        let (local, remote) = duplex(64 * 1024);
        let task = Connection::new(local, &SessionLimits::default())
            .start(Arc::new(RoomHandler::new(registry.clone())));
        (Framed::new(remote, CommandCodec::default()), task)
    }

    async fn recv(peer: &mut Framed<DuplexStream, CommandCodec>) -> String {
        peer.next().await.unwrap().unwrap().encode()
    }

    #[tokio::test]
    async fn test_rejected_entry_stops_session() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut alice, _alice_task) = spawn_session(&registry);
        let (mut impostor, impostor_task) = spawn_session(&registry);

        alice.send(Command::enter_room("Alice")).await.unwrap();
        assert_eq!(recv(&mut alice).await, "EnterRoomResponse|true|");

        impostor.send(Command::enter_room("Alice")).await.unwrap();
        assert_eq!(
            recv(&mut impostor).await,
            "EnterRoomResponse|false|name 'Alice' already in chat."
        );
        assert_eq!(impostor_task.await.unwrap(), CloseReason::Stopped);
        assert!(impostor.next().await.is_none());
        assert_eq!(registry.snapshot(), vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_get_members_lists_roster() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut alice, _a) = spawn_session(&registry);
        let (mut bob, _b) = spawn_session(&registry);

        alice.send(Command::enter_room("Alice")).await.unwrap();
        recv(&mut alice).await;
        bob.send(Command::enter_room("Bob")).await.unwrap();
        recv(&mut bob).await;

        bob.send(Command::empty(CommandKind::GetMembers)).await.unwrap();
        assert_eq!(recv(&mut bob).await, "GetMembersResponse|Alice,Bob");
    }

    #[tokio::test]
    async fn test_leaving_member_is_released() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut alice, _a) = spawn_session(&registry);
        let (mut bob, bob_task) = spawn_session(&registry);

        alice.send(Command::enter_room("Alice")).await.unwrap();
        recv(&mut alice).await;
        bob.send(Command::enter_room("Bob")).await.unwrap();
        recv(&mut bob).await;
        assert_eq!(recv(&mut alice).await, "MemberEntered|Bob");

        bob.send(Command::new(CommandKind::MemberLeaving, "Bob"))
            .await
            .unwrap();

        assert_eq!(recv(&mut alice).await, "MemberLeft|Bob");
        assert_eq!(recv(&mut bob).await, "MemberCanLeave|Bob");
        assert_eq!(bob_task.await.unwrap(), CloseReason::Stopped);
        assert_eq!(registry.snapshot(), vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_cleans_roster() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut alice, _a) = spawn_session(&registry);
        let (mut bob, bob_task) = spawn_session(&registry);

        alice.send(Command::enter_room("Alice")).await.unwrap();
        recv(&mut alice).await;
        bob.send(Command::enter_room("Bob")).await.unwrap();
        recv(&mut bob).await;
        recv(&mut alice).await;

        drop(bob);

        assert_eq!(bob_task.await.unwrap(), CloseReason::PeerClosed);
        assert_eq!(recv(&mut alice).await, "MemberLeft|Bob");
        assert_eq!(registry.snapshot(), vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_message_before_entry_is_ignored() {
        let registry = Arc::new(RoomRegistry::new());
        let (mut alice, _a) = spawn_session(&registry);
        let (mut ghost, _g) = spawn_session(&registry);

        alice.send(Command::enter_room("Alice")).await.unwrap();
        recv(&mut alice).await;

        ghost
            .send(Command::new(CommandKind::SendMessage, "boo"))
            .await
            .unwrap();
        ghost
            .send(Command::empty(CommandKind::GetMembers))
            .await
            .unwrap();

        // The ghost still gets answers, but nobody saw its message.
        assert_eq!(recv(&mut ghost).await, "GetMembersResponse|Alice");
        alice
            .send(Command::empty(CommandKind::GetMembers))
            .await
            .unwrap();
        assert_eq!(recv(&mut alice).await, "GetMembersResponse|Alice");
    }
}
