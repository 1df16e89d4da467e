//! Room view state and the window services it drives
//!
//! `RoomController` keeps what a chat window shows (title, roster,
//! transcript) and applies `ClientEvent`s to it. Rendering is left to a
//! `WindowServices` implementation supplied by the front end.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::client::{ChatClient, ClientEvent};
use crate::config::ClientSettings;
use crate::error::ClientError;

/// What the front end must provide
pub trait WindowServices: Send + Sync + 'static {
    /// Run `action` on the thread that owns the window
    fn run_on_main_thread(&self, action: Box<dyn FnOnce() + Send>);
    fn show_connection_error(&self, message: &str);
    fn close_session(&self);
    fn scroll_to_latest(&self);
    fn open_room(&self, title: &str);
}

/// Contents of the chat window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomView {
    pub title: String,
    pub members: Vec<String>,
    pub messages: Vec<String>,
}

/// Applies server events to a `RoomView` and the window
pub struct RoomController<W: WindowServices> {
    window: Arc<W>,
    view: Arc<Mutex<RoomView>>,
}

impl<W: WindowServices> RoomController<W> {
    pub fn new(window: Arc<W>) -> Self {
        Self {
            window,
            view: Arc::new(Mutex::new(RoomView::default())),
        }
    }

    /// Connect and ask to enter the room
    ///
    /// When the server cannot be reached "server not found" is shown, any
    /// other failure (e.g. invalid settings) is shown as is. Either way
    /// `None` is returned and the caller decides whether to try again.
    pub async fn connect(&self, settings: &ClientSettings) -> Option<ChatClient> {
        let client = match ChatClient::connect_with(settings).await {
            Ok(client) => client,
            Err(e @ ClientError::ConnectionFailed { .. }) => {
                warn!("Connection failed: {}", e);
                self.window.show_connection_error("server not found");
                return None;
            }
            Err(e) => {
                warn!("Cannot connect: {}", e);
                self.window.show_connection_error(&e.to_string());
                return None;
            }
        };

        if let Err(e) = client.enter_room() {
            self.window.show_connection_error(&e.to_string());
            client.close();
            return None;
        }
        Some(client)
    }

    /// Copy of the current view
    pub fn view(&self) -> RoomView {
        self.view.lock().clone()
    }

    /// Apply one event. Returns `false` once the session is over.
    pub fn apply(&self, client: &ChatClient, event: ClientEvent) -> bool {
        match event {
            ClientEvent::EnterRoomResponse(Ok(())) => {
                let title = format!("Chat - {}", client.name());
                self.view.lock().title = title.clone();
                self.window.open_room(&title);
                if let Err(e) = client.get_members() {
                    warn!("Failed to request members: {}", e);
                }
                true
            }
            ClientEvent::EnterRoomResponse(Err(reason)) => {
                self.window.show_connection_error(&reason);
                client.close();
                false
            }
            ClientEvent::Members(names) => {
                self.on_main(move |view| view.members = names);
                true
            }
            ClientEvent::MessageReceived(message) => {
                self.show_message(message);
                true
            }
            ClientEvent::MemberEntered(name) => {
                let notice = format!("{} entered the chat", name);
                self.on_main(move |view| view.members.push(name));
                self.show_message(notice);
                true
            }
            ClientEvent::MemberLeft(name) => {
                let notice = format!("{} left the chat", name);
                self.on_main(move |view| view.members.retain(|n| *n != name));
                self.show_message(notice);
                true
            }
            ClientEvent::ServerDisconnecting => {
                info!("Server is going down");
                true
            }
            ClientEvent::CanLeave(_) | ClientEvent::Closed(_) => {
                client.close();
                let window = self.window.clone();
                self.window
                    .run_on_main_thread(Box::new(move || window.close_session()));
                false
            }
        }
    }

    fn on_main(&self, update: impl FnOnce(&mut RoomView) + Send + 'static) {
        let view = self.view.clone();
        self.window
            .run_on_main_thread(Box::new(move || update(&mut view.lock())));
    }

    fn show_message(&self, message: String) {
        let view = self.view.clone();
        let window = self.window.clone();
        self.window.run_on_main_thread(Box::new(move || {
            view.lock().messages.push(message);
            window.scroll_to_latest();
        }));
    }
}
