//! Client-side tests: `ChatClient` and `RoomController` against a real server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::timeout;

use lineroom::time::FixedClock;
use lineroom::{
    ChatClient, ClientError, ClientEvent, ClientSettings, CloseReason, RoomController,
    RoomServer, ServerConfig, ServerState, WindowServices,
};

const WAIT: Duration = Duration::from_secs(5);

/// Records every window call as a short string
#[derive(Default)]
struct RecordingWindow {
    calls: Mutex<Vec<String>>,
}

impl RecordingWindow {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl WindowServices for RecordingWindow {
    fn run_on_main_thread(&self, action: Box<dyn FnOnce() + Send>) {
        action();
    }

    fn show_connection_error(&self, message: &str) {
        self.calls.lock().push(format!("error: {}", message));
    }

    fn close_session(&self) {
        self.calls.lock().push("close".to_string());
    }

    fn scroll_to_latest(&self) {
        self.calls.lock().push("scroll".to_string());
    }

    fn open_room(&self, title: &str) {
        self.calls.lock().push(format!("open: {}", title));
    }
}

async fn start_server() -> (Arc<RoomServer>, SocketAddr) {
    let config = ServerConfig {
        drain_poll_interval: Duration::from_millis(20),
        ..ServerConfig::default()
    };
    let server = Arc::new(RoomServer::with_clock(
        config,
        Arc::new(FixedClock::at(8, 0, 0)),
    ));
    let addr = server.connect("127.0.0.1", 0).await.unwrap();
    (server, addr)
}

fn settings(addr: SocketAddr, name: &str) -> ClientSettings {
    ClientSettings {
        server: addr.ip().to_string(),
        port: addr.port().to_string(),
        name: name.to_string(),
    }
}

async fn next(client: &mut ChatClient) -> ClientEvent {
    timeout(WAIT, client.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

async fn entered(addr: SocketAddr, name: &str) -> ChatClient {
    let mut client = ChatClient::connect(&addr.ip().to_string(), addr.port(), name)
        .await
        .unwrap();
    client.enter_room().unwrap();
    assert_eq!(next(&mut client).await, ClientEvent::EnterRoomResponse(Ok(())));
    client
}

/// Every remaining event, up to and including `Closed`
async fn until_closed(client: &mut ChatClient) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    loop {
        let event = next(client).await;
        let done = matches!(event, ClientEvent::Closed(_));
        events.push(event);
        if done {
            return events;
        }
    }
}

/// A port nothing listens on
async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_connection_failure_is_reported() {
    let port = unused_port().await;

    let result = ChatClient::connect("127.0.0.1", port, "Alice").await;

    assert!(matches!(result, Err(ClientError::ConnectionFailed { .. })));
}

#[tokio::test]
async fn test_client_chat_round_trip() {
    let (_server, addr) = start_server().await;
    let mut alice = entered(addr, "Alice").await;
    let mut bob = entered(addr, "Bob").await;
    assert_eq!(
        next(&mut alice).await,
        ClientEvent::MemberEntered("Bob".to_string())
    );

    bob.get_members().unwrap();
    assert_eq!(
        next(&mut bob).await,
        ClientEvent::Members(vec!["Alice".to_string(), "Bob".to_string()])
    );

    bob.send_message("").unwrap();
    bob.send_message("hello").unwrap();
    let expected = ClientEvent::MessageReceived("[08:00:00] Bob - hello".to_string());
    assert_eq!(next(&mut alice).await, expected);
    assert_eq!(next(&mut bob).await, expected);

    bob.leave_room().unwrap();
    assert_eq!(next(&mut bob).await, ClientEvent::CanLeave("Bob".to_string()));
    assert_eq!(next(&mut bob).await, ClientEvent::Closed(CloseReason::Stopped));
    assert_eq!(
        next(&mut alice).await,
        ClientEvent::MemberLeft("Bob".to_string())
    );
}

#[tokio::test]
async fn test_client_leaves_when_server_disconnects() {
    let (server, addr) = start_server().await;
    let mut alice = entered(addr, "Alice").await;
    let mut bob = entered(addr, "Bob").await;
    assert_eq!(
        next(&mut alice).await,
        ClientEvent::MemberEntered("Bob".to_string())
    );

    timeout(WAIT, server.disconnect()).await.unwrap().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    for (client, name) in [(&mut alice, "Alice"), (&mut bob, "Bob")] {
        let events = until_closed(client).await;
        assert_eq!(events.first(), Some(&ClientEvent::ServerDisconnecting));
        assert!(events.contains(&ClientEvent::CanLeave(name.to_string())));
        assert_eq!(
            events.last(),
            Some(&ClientEvent::Closed(CloseReason::Stopped))
        );
    }
}

#[tokio::test]
async fn test_controller_follows_the_room() {
    let (_server, addr) = start_server().await;
    let window = Arc::new(RecordingWindow::default());
    let controller = RoomController::new(window.clone());

    let mut alice = controller.connect(&settings(addr, "Alice")).await.unwrap();
    // acceptance, then the member list it triggers
    for _ in 0..2 {
        let event = next(&mut alice).await;
        assert!(controller.apply(&alice, event));
    }
    assert_eq!(controller.view().title, "Chat - Alice");
    assert_eq!(controller.view().members, vec!["Alice"]);

    let bob = entered(addr, "Bob").await;
    bob.send_message("hi").unwrap();
    bob.leave_room().unwrap();
    for _ in 0..3 {
        let event = next(&mut alice).await;
        assert!(controller.apply(&alice, event));
    }

    let view = controller.view();
    assert_eq!(view.members, vec!["Alice"]);
    assert_eq!(
        view.messages,
        vec![
            "Bob entered the chat",
            "[08:00:00] Bob - hi",
            "Bob left the chat",
        ]
    );

    alice.leave_room().unwrap();
    let event = next(&mut alice).await;
    assert!(!controller.apply(&alice, event));
    assert!(alice.is_closed());
    assert_eq!(
        window.calls(),
        vec!["open: Chat - Alice", "scroll", "scroll", "scroll", "close"]
    );
}

#[tokio::test]
async fn test_controller_reports_rejection() {
    let (_server, addr) = start_server().await;
    let _alice = entered(addr, "Alice").await;
    let window = Arc::new(RecordingWindow::default());
    let controller = RoomController::new(window.clone());

    let mut impostor = controller.connect(&settings(addr, "Alice")).await.unwrap();
    let event = next(&mut impostor).await;

    assert!(!controller.apply(&impostor, event));
    assert_eq!(
        window.calls(),
        vec!["error: name 'Alice' already in chat."]
    );
}

#[tokio::test]
async fn test_controller_reports_unreachable_server() {
    let port = unused_port().await;
    let window = Arc::new(RecordingWindow::default());
    let controller = RoomController::new(window.clone());
    let settings = ClientSettings {
        server: "127.0.0.1".to_string(),
        port: port.to_string(),
        name: "Alice".to_string(),
    };

    assert!(controller.connect(&settings).await.is_none());
    assert_eq!(window.calls(), vec!["error: server not found"]);
}

#[tokio::test]
async fn test_controller_reports_invalid_settings() {
    let (_server, addr) = start_server().await;
    let window = Arc::new(RecordingWindow::default());
    let controller = RoomController::new(window.clone());

    assert!(controller.connect(&settings(addr, "  ")).await.is_none());
    assert_eq!(
        window.calls(),
        vec!["error: config error: name must not be empty"]
    );
}
