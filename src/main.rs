//! Chat room server - Entry Point
//!
//! Starts the room server, waits for Ctrl-C, then drains the room before
//! exiting.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use lineroom::config::{DEFAULT_ADDRESS, DEFAULT_PORT};
use lineroom::logger::setup_logger;
use lineroom::{RoomServer, ServerConfig, ServerState};

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-oriented TCP chat room server")]
struct Args {
    /// Address to listen on (`localhost` is accepted)
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    address: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Stop waiting for members to leave after this many seconds
    #[arg(long)]
    drain_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let config = ServerConfig {
        drain_timeout: args.drain_timeout_secs.map(Duration::from_secs),
        ..ServerConfig::default()
    };
    let server = RoomServer::new(config);

    let mut states = server.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow();
            match state {
                ServerState::Running => info!("Connected"),
                ServerState::Draining => info!("Waiting for members to leave"),
                ServerState::Stopped => info!("Disconnected"),
            }
        }
    });

    let addr = match server.connect(&args.address, args.port).await {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Err(e.into());
        }
    };
    info!("Chat room listening on {} (Ctrl-C to stop)", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, {} members in the room", server.registry().len());
    server.disconnect().await?;

    Ok(())
}
