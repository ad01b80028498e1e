/// Connection lifecycle against a scratch TCP server
mod support;

use lifelink_chat::config::Config;
use lifelink_chat::connection::{ConnectionManager, EventSink};
use lifelink_chat::events::{ChannelEvent, ClientEvent, ServerEvent};
use lifelink_chat::wire::{read_frame, write_event};
use std::net::SocketAddr;
use std::time::Duration;
use support::wire_message;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

fn test_config(event_addr: SocketAddr) -> Config {
    Config {
        event_addr,
        reconnect_initial: Duration::from_millis(50),
        reconnect_cap: Duration::from_millis(200),
        max_reconnect_attempts: 5,
        degraded_after: 2,
        ..Default::default()
    }
}

async fn next_event(rx: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event channel closed")
}

async fn read_client_event(stream: &mut TcpStream) -> ClientEvent {
    let frame = timeout(Duration::from_secs(5), read_frame(stream))
        .await
        .expect("timed out reading frame")
        .expect("read failed")
        .expect("stream closed");
    frame.decode().expect("undecodable client event")
}

#[tokio::test]
async fn connect_authenticates_then_relays_events_both_ways() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let manager = ConnectionManager::new(test_config(listener.local_addr().unwrap()));
    let mut rx = manager.subscribe();

    manager.connect("session-token");
    let (mut server, _) = listener.accept().await.unwrap();

    // First frame binds the channel to the session
    assert_eq!(
        read_client_event(&mut server).await,
        ClientEvent::Auth {
            token: "session-token".to_string()
        }
    );
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Up));
    assert!(manager.connected());

    // Server -> client
    write_event(
        &mut server,
        &ServerEvent::NewMessage {
            conversation_id: "c1".to_string(),
            message: wire_message("m1", "c1", "donor-7", "hello"),
        },
    )
    .await
    .unwrap();
    match next_event(&mut rx).await {
        ChannelEvent::Server(ServerEvent::NewMessage {
            conversation_id, ..
        }) => assert_eq!(conversation_id, "c1"),
        other => panic!("expected new-message event, got {:?}", other),
    }

    // Client -> server
    manager.emit(ClientEvent::MarkRead {
        conversation_id: "c1".to_string(),
    });
    assert_eq!(
        read_client_event(&mut server).await,
        ClientEvent::MarkRead {
            conversation_id: "c1".to_string()
        }
    );

    manager.dispose();
}

#[tokio::test]
async fn server_pings_are_answered_with_pongs() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let manager = ConnectionManager::new(test_config(listener.local_addr().unwrap()));
    let mut rx = manager.subscribe();

    manager.connect("t");
    let (mut server, _) = listener.accept().await.unwrap();
    read_client_event(&mut server).await; // auth
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Up));

    write_event(&mut server, &ServerEvent::Ping { timestamp: 7 })
        .await
        .unwrap();
    assert_eq!(
        read_client_event(&mut server).await,
        ClientEvent::Pong { timestamp: 7 }
    );

    manager.dispose();
}

#[tokio::test]
async fn connect_is_idempotent_while_alive() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let manager = ConnectionManager::new(test_config(listener.local_addr().unwrap()));
    let mut rx = manager.subscribe();

    manager.connect("t");
    let _server = listener.accept().await.unwrap();
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Up));

    // Second connect reuses the live connection instead of opening another
    manager.connect("t");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(timeout(Duration::from_millis(200), listener.accept())
        .await
        .is_err());

    manager.dispose();
}

#[tokio::test]
async fn emit_while_disconnected_is_a_silent_no_op() {
    // Grab a port with no listener behind it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ConnectionManager::new(test_config(addr));
    assert!(!manager.connected());
    manager.emit(ClientEvent::MarkRead {
        conversation_id: "c1".to_string(),
    });

    manager.connect("t");
    manager.emit(ClientEvent::MarkRead {
        conversation_id: "c1".to_string(),
    });
    assert!(!manager.connected());

    manager.dispose();
}

#[tokio::test]
async fn dropped_connection_recovers_and_reports_restoration() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let manager = ConnectionManager::new(test_config(listener.local_addr().unwrap()));
    let mut rx = manager.subscribe();

    manager.connect("t");
    let (server, _) = listener.accept().await.unwrap();
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Up));

    // Kill the server side; the client must reconnect on its own
    drop(server);
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Down));

    let (mut server, _) = listener.accept().await.unwrap();
    read_client_event(&mut server).await; // fresh auth

    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Restored));
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Up));

    manager.dispose();
}

#[tokio::test]
async fn repeated_failures_surface_one_degraded_notice() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager = ConnectionManager::new(test_config(addr));
    let mut rx = manager.subscribe();
    manager.connect("t");

    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Degraded));
    // Mid-outage the counter reads live, not a stale snapshot
    assert!(manager.reconnect_attempts() >= 2);

    // The loop gives up at the attempt ceiling without a second notice
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(rx.try_recv().is_err());

    manager.dispose();
}

#[tokio::test]
async fn dispose_tears_the_channel_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let manager = ConnectionManager::new(test_config(listener.local_addr().unwrap()));
    let mut rx = manager.subscribe();

    manager.connect("t");
    let _server = listener.accept().await.unwrap();
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Up));

    manager.dispose();
    assert!(matches!(next_event(&mut rx).await, ChannelEvent::Down));
    assert!(!manager.connected());
}
