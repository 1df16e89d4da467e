//! Connection session
//!
//! One `Connection` per socket. Its read loop decodes newline-delimited
//! frames and hands each command to a `CommandHandler`; a separate writer
//! task drains the session's bounded outbound queue, so code that sends to a
//! session (broadcasts under the roster lock included) never waits on the
//! network.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::CommandCodec;
use crate::command::Command;
use crate::config::SessionLimits;
use crate::error::SendError;
use crate::types::SessionId;

/// What the read loop does after a handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Why a session's read loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// A handler returned `Flow::Stop`
    Stopped,
    /// The peer closed the connection
    PeerClosed,
    /// `close()` was called, or writing to the peer failed
    Closed,
    /// A frame could not be read or decoded
    Invalid(String),
}

/// Receives the commands decoded by a session's read loop
pub trait CommandHandler: Send + Sync + 'static {
    /// Handle one inbound command. Kinds the handler does not care about
    /// should be ignored with `Flow::Continue`.
    fn handle(&self, session: &mut Session, command: Command) -> Flow;

    /// Called once when the read loop has ended, before the socket closes
    fn closed(&self, _session: &Session, _reason: &CloseReason) {}
}

/// Cloneable write side of a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbound: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue one frame for the peer without waiting
    ///
    /// A full queue means the peer stopped reading: the session is closed
    /// and `SendError::QueueFull` returned. Nothing is retried.
    pub fn send(&self, command: Command) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        match self.outbound.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(command)) => {
                warn!(
                    session = %self.id,
                    kind = %command.kind,
                    "Outbound queue full, closing session"
                );
                self.close();
                Err(SendError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Ask the session to shut down. Idempotent.
    ///
    /// Frames already queued are still flushed (bounded by the write timeout).
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Per-connection state visible to handlers
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    /// Display name, set once the room accepted it
    name: Option<String>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub fn send(&self, command: Command) -> Result<(), SendError> {
        self.handle.send(command)
    }

    pub fn close(&self) {
        self.handle.close();
    }
}

type CommandSink<S> = SplitSink<Framed<S, CommandCodec>, Command>;

/// An accepted (or dialed) connection whose read loop has not started yet
pub struct Connection<S> {
    session: Session,
    reader: SplitStream<Framed<S, CommandCodec>>,
    writer: JoinHandle<()>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap a stream and spawn its writer task
    pub fn new(stream: S, limits: &SessionLimits) -> Self {
        let framed = Framed::new(stream, CommandCodec::new(limits.max_frame_length));
        let (sink, reader) = framed.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(limits.outbound_capacity.max(1));
        let cancel = CancellationToken::new();
        let id = SessionId::new();

        let writer = tokio::spawn(write_loop(
            id,
            sink,
            outbound_rx,
            cancel.clone(),
            limits.write_timeout,
        ));

        Self {
            session: Session {
                handle: SessionHandle {
                    id,
                    outbound: outbound_tx,
                    cancel,
                },
                name: None,
            },
            reader,
            writer,
        }
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    pub fn handle(&self) -> SessionHandle {
        self.session.handle.clone()
    }

    /// Spawn the read loop
    pub fn start<H: CommandHandler>(self, handler: Arc<H>) -> JoinHandle<CloseReason> {
        tokio::spawn(self.run(handler))
    }

    /// Read and dispatch frames until the peer leaves, a frame is invalid,
    /// a handler stops the loop, or the session is closed.
    pub async fn run<H: CommandHandler>(self, handler: Arc<H>) -> CloseReason {
        let Connection {
            mut session,
            mut reader,
            writer,
        } = self;
        let cancel = session.handle.cancel.clone();

        let reason = loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break CloseReason::Closed,
                frame = reader.next() => frame,
            };

            match frame {
                Some(Ok(command)) => {
                    debug!(session = %session.id(), kind = %command.kind, "Received command");
                    if handler.handle(&mut session, command) == Flow::Stop {
                        break CloseReason::Stopped;
                    }
                }
                Some(Err(e)) => {
                    warn!(session = %session.id(), "Invalid frame: {}", e);
                    break CloseReason::Invalid(e.to_string());
                }
                None => break CloseReason::PeerClosed,
            }
        };

        handler.closed(&session, &reason);

        session.close();
        drop(reader);
        if let Err(e) = writer.await {
            warn!(session = %session.id(), "Write task failed: {}", e);
        }

        info!(session = %session.id(), ?reason, "Session closed");
        reason
    }
}

async fn write_loop<S>(
    id: SessionId,
    mut sink: CommandSink<S>,
    mut outbound: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    write_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = outbound.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match timeout(write_timeout, sink.send(command)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(session = %id, "Write failed: {}", e);
                cancel.cancel();
                return;
            }
            Err(_) => {
                warn!(session = %id, "Write timed out after {:?}", write_timeout);
                cancel.cancel();
                return;
            }
        }
    }

    // Flush frames queued before the close (e.g. MemberCanLeave), then shut
    // down the write half.
    outbound.close();
    let flush = async {
        while let Some(command) = outbound.recv().await {
            sink.feed(command).await?;
        }
        sink.close().await
    };
    match timeout(write_timeout, flush).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(session = %id, "Final flush failed: {}", e),
        Err(_) => debug!(session = %id, "Final flush timed out"),
    }

    debug!(session = %id, "Write task ended");
}
