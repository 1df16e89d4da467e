//! Chat client
//!
//! Dials the room server and speaks the same line protocol through a
//! `Connection`. Server commands are turned into `ClientEvent`s on a
//! channel. The client answers `ServerDisconnecting` by leaving on its own,
//! and stops reading after `MemberCanLeave` or a rejected `EnterRoom`.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{parse_enter_room_response, parse_members, Command, CommandKind};
use crate::config::{ClientSettings, SessionLimits};
use crate::error::ClientError;
use crate::session::{CloseReason, CommandHandler, Connection, Flow, Session, SessionHandle};

/// Something the server told this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Answer to `EnterRoom`: `Err` carries the rejection text
    EnterRoomResponse(Result<(), String>),
    Members(Vec<String>),
    MessageReceived(String),
    MemberEntered(String),
    MemberLeft(String),
    /// The server released this client; the connection is closing
    CanLeave(String),
    /// The server is shutting down; a `MemberLeaving` was already sent
    ServerDisconnecting,
    /// The connection is gone
    Closed(CloseReason),
}

struct ClientHandler {
    name: String,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientHandler {
    fn emit(&self, event: ClientEvent) {
        // The receiver may already be gone when the owner stopped listening.
        let _ = self.events.send(event);
    }
}

impl CommandHandler for ClientHandler {
    fn handle(&self, session: &mut Session, command: Command) -> Flow {
        match command.kind {
            CommandKind::EnterRoomResponse => {
                let verdict = parse_enter_room_response(&command.payload);
                let accepted = verdict.is_ok();
                if accepted {
                    session.set_name(self.name.clone());
                }
                self.emit(ClientEvent::EnterRoomResponse(verdict));
                if accepted {
                    Flow::Continue
                } else {
                    Flow::Stop
                }
            }
            CommandKind::GetMembersResponse => {
                self.emit(ClientEvent::Members(parse_members(&command.payload)));
                Flow::Continue
            }
            CommandKind::MessageReceived => {
                self.emit(ClientEvent::MessageReceived(command.payload));
                Flow::Continue
            }
            CommandKind::MemberEntered => {
                self.emit(ClientEvent::MemberEntered(command.payload));
                Flow::Continue
            }
            CommandKind::MemberLeft => {
                self.emit(ClientEvent::MemberLeft(command.payload));
                Flow::Continue
            }
            CommandKind::MemberCanLeave => {
                self.emit(ClientEvent::CanLeave(command.payload));
                Flow::Stop
            }
            CommandKind::ServerDisconnecting => {
                info!("Server is disconnecting, leaving the room");
                let _ = session.send(Command::new(CommandKind::MemberLeaving, self.name.as_str()));
                self.emit(ClientEvent::ServerDisconnecting);
                Flow::Continue
            }
            kind => {
                debug!("Ignoring {} from server", kind);
                Flow::Continue
            }
        }
    }

    fn closed(&self, _session: &Session, reason: &CloseReason) {
        self.emit(ClientEvent::Closed(reason.clone()));
    }
}

/// A connected chat client
pub struct ChatClient {
    name: String,
    session: SessionHandle,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    task: JoinHandle<CloseReason>,
}

impl ChatClient {
    /// Connect to `server:port` as `name`
    ///
    /// Failure to reach the server is returned as
    /// `ClientError::ConnectionFailed`; no retry is attempted.
    pub async fn connect(server: &str, port: u16, name: &str) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", server.trim(), port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::ConnectionFailed {
                addr: addr.clone(),
                source,
            })?;
        info!("Connected to {} as '{}'", addr, name);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Connection::new(stream, &SessionLimits::default());
        let session = connection.handle();
        let task = connection.start(Arc::new(ClientHandler {
            name: name.to_string(),
            events: events_tx,
        }));

        Ok(Self {
            name: name.to_string(),
            session,
            events: events_rx,
            task,
        })
    }

    /// Connect using persisted settings
    pub async fn connect_with(settings: &ClientSettings) -> Result<Self, ClientError> {
        settings.validate()?;
        Self::connect(&settings.server, settings.port()?, settings.name.trim()).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enter_room(&self) -> Result<(), ClientError> {
        self.send(Command::enter_room(&self.name))
    }

    pub fn get_members(&self) -> Result<(), ClientError> {
        self.send(Command::empty(CommandKind::GetMembers))
    }

    /// Send a chat message; empty text is not sent
    pub fn send_message(&self, text: &str) -> Result<(), ClientError> {
        if text.is_empty() {
            return Ok(());
        }
        self.send(Command::new(CommandKind::SendMessage, text))
    }

    /// Start the leave handshake; the server answers with `MemberCanLeave`
    pub fn leave_room(&self) -> Result<(), ClientError> {
        self.send(Command::new(CommandKind::MemberLeaving, self.name.as_str()))
    }

    /// Next server event; `None` once the connection ended and all events were read
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Drop the connection. Idempotent.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Wait for the connection to end
    pub async fn finished(self) -> Option<CloseReason> {
        self.task.await.ok()
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        Ok(self.session.send(command)?)
    }
}
