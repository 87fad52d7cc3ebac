//! Integration tests for the client facade over the memory transport.

use std::time::Duration;

use uw_client::{ServerEndpoint, UwaveClient, User};
use uw_core::error::UwError;
use uw_socket::memory::{self, ClientFrame, MemoryServer};
use uw_socket::{ConnectionOptions, ConnectionState, InboundEvent};

const STEP: Duration = Duration::from_secs(5);

async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(STEP, fut).await.expect("step timed out")
}

async fn open_client() -> (UwaveClient, MemoryServer) {
    let (connector, server) = memory::pair();
    let endpoint = ServerEndpoint::new("http://localhost:6042/api", "ws://localhost:6042").unwrap();
    let options = ConnectionOptions {
        close_timeout: Duration::from_millis(200),
        ..ConnectionOptions::default()
    };
    let client = UwaveClient::with_connector(endpoint, connector, options).unwrap();
    within(client.wait_open()).await.unwrap();
    (client, server)
}

#[tokio::test]
async fn every_subscriber_sees_every_event() {
    let (client, server) = open_client().await;
    let mut first = client.subscribe();
    let mut second = client.subscribe();

    server.push_text(r#"{"command":"waitlistLock","data":{"locked":true}}"#);
    server.push_text(r#"{"command":"nameChange","data":{"userID":"u1","username":"Rena K"}}"#);

    for sub in [&mut first, &mut second] {
        assert_eq!(
            within(sub.recv()).await.unwrap(),
            InboundEvent::WaitlistLocked { locked: true }
        );
    }

    let mut user = User {
        user_id: "u1".into(),
        avatar: String::new(),
        username: "Rena".into(),
        roles: Vec::new(),
    };
    for sub in [&mut first, &mut second] {
        let event = within(sub.recv()).await.unwrap();
        user.apply(&event);
    }
    assert_eq!(user.username, "Rena K");
}

#[tokio::test]
async fn subscriber_registered_while_connecting_sees_first_event() {
    let (connector, server) = memory::pair();
    let (connector, gate) = connector.with_handshake_gate();
    let endpoint = ServerEndpoint::new("http://localhost:6042/api", "ws://localhost:6042").unwrap();
    let client =
        UwaveClient::with_connector(endpoint, connector, ConnectionOptions::default()).unwrap();

    let mut sub = client.subscribe();
    server.push_text(r#"{"command":"waitlistClear"}"#);
    gate.open();
    within(client.wait_open()).await.unwrap();

    assert_eq!(within(sub.recv()).await.unwrap(), InboundEvent::WaitlistCleared);
}

#[tokio::test]
async fn late_subscriber_sees_no_history() {
    let (client, server) = open_client().await;
    let mut early = client.subscribe();

    server.push_text(r#"{"command":"chatDelete"}"#);
    assert_eq!(
        within(early.recv()).await.unwrap(),
        InboundEvent::ChatClearedAll
    );

    let mut late = client.subscribe();
    server.push_text(r#"{"command":"waitlistClear"}"#);
    assert_eq!(within(late.recv()).await.unwrap(), InboundEvent::WaitlistCleared);
    assert_eq!(within(early.recv()).await.unwrap(), InboundEvent::WaitlistCleared);
}

#[tokio::test]
async fn commands_reach_the_server() {
    let (client, mut server) = open_client().await;

    client.authenticate("token").await.unwrap();
    client.vote(1).await.unwrap();
    client.send_chat("nice track").await.unwrap();

    let expected = [
        "token",
        r#"{"command":"vote","data":1}"#,
        r#"{"command":"sendChat","data":"nice track"}"#,
    ];
    for text in expected {
        assert_eq!(
            within(server.recv()).await,
            Some(ClientFrame::Text(text.to_string()))
        );
    }
}

#[tokio::test]
async fn close_ends_every_subscription() {
    let (client, _server) = open_client().await;
    let mut first = client.subscribe();
    let mut second = client.subscribe();

    within(client.close()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);

    assert!(matches!(within(first.recv()).await, Err(UwError::Closed)));
    assert!(matches!(within(second.recv()).await, Err(UwError::Closed)));
    let mut after = client.subscribe();
    assert!(matches!(within(after.recv()).await, Err(UwError::Closed)));
}

#[tokio::test]
async fn close_withdraws_event_from_stalled_subscriber() {
    let (client, server) = open_client().await;
    let mut stalled = client.subscribe();

    server.push_text(r#"{"command":"waitlistLock","data":{"locked":true}}"#);
    // Let the event reach the stalled subscriber's slot.
    tokio::time::sleep(Duration::from_millis(50)).await;

    within(client.close()).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(within(stalled.recv()).await, Err(UwError::Closed)));
    assert!(matches!(within(stalled.recv()).await, Err(UwError::Closed)));
}

#[tokio::test]
async fn failure_reaches_subscribers_as_transport_error() {
    let (client, server) = open_client().await;
    let mut sub = client.subscribe();

    server.fail("broken pipe");
    match within(sub.recv()).await {
        Err(UwError::Transport(reason)) => assert_eq!(reason, "broken pipe"),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(client.vote(1).await.unwrap_err().is_transport());
}
