//! Line-oriented TCP chat room
//!
//! A server accepts many concurrent connections, keeps a roster of named
//! members and broadcasts messages and membership events to all of them.
//!
//! # Protocol
//! One command per newline-terminated frame: `<KIND>|<PAYLOAD>`, e.g.
//! `EnterRoom|Alice` or `MessageReceived|[12:00:00] Alice - hi`.
//!
//! # Architecture
//! - `RoomServer` accepts connections and runs the drain on shutdown
//! - each connection is a `Connection`: a read loop dispatching to a
//!   `CommandHandler` plus a writer task draining a bounded outbound queue
//! - `RoomRegistry` is the roster; joins, leaves and broadcasts happen
//!   under one lock, so every member sees the same order of events
//! - `ChatClient` and `RoomController` are the client side
//!
//! # Example
//! ```ignore
//! use lineroom::{RoomServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = RoomServer::new(ServerConfig::default());
//!     server.connect("127.0.0.1", 7777).await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod logger;
pub mod registry;
pub mod server;
pub mod session;
pub mod time;
pub mod types;
pub mod window;

// Re-export main types for convenience
pub use client::{ChatClient, ClientEvent};
pub use codec::CommandCodec;
pub use command::{Command, CommandKind};
pub use config::{ClientSettings, ServerConfig, SessionLimits};
pub use error::{ClientError, CodecError, ConfigError, DecodeError, SendError, ServerError};
pub use registry::{EnterOutcome, RoomRegistry};
pub use server::RoomServer;
pub use session::{CloseReason, CommandHandler, Connection, Flow, Session, SessionHandle};
pub use types::{ServerState, SessionId};
pub use window::{RoomController, RoomView, WindowServices};
