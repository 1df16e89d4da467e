//! Room server
//!
//! Owns the listener and the room registry and runs the lifecycle
//! `Stopped -> Running -> Draining -> Stopped`. State changes are published
//! on a `watch` channel: `Running` is the "connected" notification, the
//! return to `Stopped` after a drain is "disconnected".

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{listen_addr, ServerConfig};
use crate::error::ServerError;
use crate::handler::RoomHandler;
use crate::registry::RoomRegistry;
use crate::session::{Connection, SessionHandle};
use crate::time::Clock;
use crate::types::ServerState;

/// A live accept loop
struct Listener {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// The chat room server
pub struct RoomServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    state: watch::Sender<ServerState>,
    /// Serializes `connect` and `disconnect`
    listener: Mutex<Option<Listener>>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl RoomServer {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(RoomRegistry::new()))
    }

    /// Server whose message timestamps come from `clock`
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_registry(config, Arc::new(RoomRegistry::with_clock(clock)))
    }

    fn with_registry(config: ServerConfig, registry: Arc<RoomRegistry>) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            config,
            registry,
            state,
            listener: Mutex::new(None),
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watch lifecycle changes
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Address the listener is bound to, while running or draining
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind `address:port` and start accepting connections
    ///
    /// Bind errors are returned to the caller; accepting runs in a
    /// background task. Port 0 picks a free port, see the returned address.
    pub async fn connect(&self, address: &str, port: u16) -> Result<SocketAddr, ServerError> {
        let mut slot = self.listener.lock().await;
        let state = self.state();
        if state != ServerState::Stopped {
            return Err(ServerError::AlreadyRunning(state));
        }

        let addr = listen_addr(address, port)?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        self.registry.open();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            self.registry.clone(),
            self.config.clone(),
            shutdown.clone(),
        ));
        *slot = Some(Listener { shutdown, task });
        *self.local_addr.lock() = Some(local_addr);

        self.state.send_replace(ServerState::Running);
        info!("Room server connected on {}", local_addr);
        Ok(local_addr)
    }

    /// Coordinated shutdown
    ///
    /// Sends `ServerDisconnecting` to every member, waits until each has
    /// completed its own leave (polling the roster), then stops the listener
    /// and closes connections that never entered the room.
    /// Connections accepted during the drain are still served, so late
    /// joiners are waited for as well. Without a drain timeout this waits
    /// for as long as any member stays.
    pub async fn disconnect(&self) -> Result<(), ServerError> {
        let mut slot = self.listener.lock().await;
        if self.state() != ServerState::Running {
            return Err(ServerError::NotRunning);
        }

        self.state.send_replace(ServerState::Draining);
        self.registry.broadcast_server_disconnecting();

        let started = Instant::now();
        let mut poll = tokio::time::interval(self.config.drain_poll_interval);
        loop {
            poll.tick().await;
            // Closing and the emptiness check share one lock, so nobody
            // slips in between.
            if self.registry.close_if_empty() {
                break;
            }
            debug!("Draining: {} members still in the room", self.registry.len());

            if let Some(limit) = self.config.drain_timeout {
                if started.elapsed() >= limit {
                    self.registry.close();
                    let evicted = self.registry.evict_all();
                    warn!("Drain timed out after {:?}, evicted {:?}", limit, evicted);
                    break;
                }
            }
        }

        // Connections that never sent EnterRoom are closed by the accept
        // loop on its way out.
        if let Some(listener) = slot.take() {
            listener.shutdown.cancel();
            if let Err(e) = listener.task.await {
                error!("Accept task failed: {}", e);
            }
        }

        *self.local_addr.lock() = None;
        self.state.send_replace(ServerState::Stopped);
        info!("Room server disconnected");
        Ok(())
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<RoomRegistry>,
    config: ServerConfig,
    shutdown: CancellationToken,
) {
    let handler = Arc::new(RoomHandler::new(registry));
    let mut sessions: Vec<SessionHandle> = Vec::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                    }
                    let connection = Connection::new(stream, &config.session);
                    info!(session = %connection.id(), "New connection from {}", peer);
                    sessions.retain(|s| !s.is_closed());
                    sessions.push(connection.handle());
                    connection.start(handler.clone());
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(config.accept_retry_delay).await;
                }
            },
        }
    }

    sessions.retain(|s| !s.is_closed());
    if !sessions.is_empty() {
        info!("Closing {} connections that never entered the room", sessions.len());
    }
    for session in sessions {
        session.close();
    }

    info!("Listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            drain_poll_interval: Duration::from_millis(20),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_publishes_running() {
        let server = RoomServer::new(fast_config());
        let mut states = server.subscribe();
        assert_eq!(server.state(), ServerState::Stopped);

        let addr = server.connect("127.0.0.1", 0).await.unwrap();

        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), ServerState::Running);
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let server = RoomServer::new(fast_config());
        server.connect("127.0.0.1", 0).await.unwrap();

        assert!(matches!(
            server.connect("127.0.0.1", 0).await,
            Err(ServerError::AlreadyRunning(ServerState::Running))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_stopped_fails() {
        let server = RoomServer::new(fast_config());
        assert!(matches!(
            server.disconnect().await,
            Err(ServerError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_empty_room_disconnects_and_can_restart() {
        let server = RoomServer::new(fast_config());
        server.connect("127.0.0.1", 0).await.unwrap();

        server.disconnect().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(server.local_addr(), None);

        server.connect("localhost", 0).await.unwrap();
        assert_eq!(server.state(), ServerState::Running);
    }

    #[tokio::test]
    async fn test_bad_address_is_reported() {
        let server = RoomServer::new(fast_config());
        assert!(matches!(
            server.connect("not-an-ip", 0).await,
            Err(ServerError::Config(_))
        ));
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
