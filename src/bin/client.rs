//! Terminal chat client
//!
//! Reads lines from stdin: `/members` lists the room, `/quit` leaves,
//! anything else is sent as a message. Settings are remembered in a JSON
//! file between runs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use lineroom::logger::setup_logger;
use lineroom::{ClientSettings, RoomController, WindowServices};

#[derive(Parser, Debug)]
#[command(author, version, about = "Line-oriented TCP chat room client")]
struct Args {
    /// Server address (defaults to the saved setting)
    #[arg(short, long)]
    server: Option<String>,

    /// Server port (defaults to the saved setting)
    #[arg(short, long)]
    port: Option<String>,

    /// Display name (defaults to the saved setting)
    #[arg(short, long)]
    name: Option<String>,

    /// Settings file
    #[arg(long, default_value = "lineroom-client.json")]
    settings: PathBuf,
}

/// Window services on a plain terminal
struct Terminal;

impl WindowServices for Terminal {
    fn run_on_main_thread(&self, action: Box<dyn FnOnce() + Send>) {
        action();
    }

    fn show_connection_error(&self, message: &str) {
        eprintln!("error: {}", message);
    }

    fn close_session(&self) {
        println!("-- left the chat --");
    }

    fn scroll_to_latest(&self) {}

    fn open_room(&self, title: &str) {
        println!("== {} ==", title);
        println!("Type a message and press Enter. /members lists the room, /quit leaves.");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_logger(env!("CARGO_BIN_NAME"), "warn");

    let mut settings = ClientSettings::load_or_default(&args.settings)?;
    if let Some(server) = args.server {
        settings.server = server;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(name) = args.name {
        settings.name = name;
    }
    settings.validate()?;
    if let Err(e) = settings.save(&args.settings) {
        warn!("Could not save settings: {}", e);
    }

    let controller = RoomController::new(Arc::new(Terminal));
    let Some(mut client) = controller.connect(&settings).await else {
        std::process::exit(1);
    };

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut printed = 0;

    loop {
        tokio::select! {
            event = client.next_event() => {
                let Some(event) = event else { break };
                let keep_going = controller.apply(&client, event);

                let view = controller.view();
                for line in view.messages.iter().skip(printed) {
                    println!("{}", line);
                }
                printed = view.messages.len();

                if !keep_going {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                let result = match line? {
                    Some(line) => match line.trim() {
                        "/quit" => client.leave_room(),
                        "/members" => {
                            println!("members: {}", controller.view().members.join(", "));
                            Ok(())
                        }
                        _ => client.send_message(&line),
                    },
                    None => {
                        stdin_open = false;
                        client.leave_room()
                    }
                };
                if let Err(e) = result {
                    eprintln!("error: {}", e);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                client.leave_room()?;
            }
        }
    }

    Ok(())
}
