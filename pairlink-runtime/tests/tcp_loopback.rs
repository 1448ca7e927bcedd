//! Two managers talking over real loopback TCP.

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use pairlink_runtime::tcp::TcpTransport;
use pairlink_runtime::{
    ConnectFailure, ConnectionManager, ConnectionState, Event, EventStream, ManagerConfig,
    RestartPolicy,
};

const WAIT: Duration = Duration::from_secs(10);

fn free_port() -> SocketAddr {
    let socket = TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

/// Skip events until one matches.
async fn wait_for(events: &mut EventStream, wanted: impl Fn(&Event) -> bool) -> Event {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn exchange_and_disconnect() {
    let server_addr = free_port();
    let (server, mut server_events) =
        ConnectionManager::new(TcpTransport::new(server_addr), ManagerConfig::default());
    let (client, mut client_events) =
        ConnectionManager::new(TcpTransport::new(free_port()), ManagerConfig::default());

    server.start().await.unwrap();
    wait_for(&mut server_events, |e| {
        *e == Event::state_changed(ConnectionState::Idle, ConnectionState::Listening)
    })
    .await;

    // The server binds asynchronously; retry until the dial lands.
    let mut attempts = 0;
    loop {
        attempts += 1;
        client.dial(&server_addr.to_string()).await.unwrap();
        let outcome = wait_for(&mut client_events, |e| {
            matches!(e, Event::Connected { .. } | Event::ConnectFailed { .. })
        })
        .await;
        if matches!(outcome, Event::Connected { .. }) {
            break;
        }
        assert!(attempts < 50, "server never accepted");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    wait_for(&mut server_events, |e| matches!(e, Event::Connected { .. })).await;
    assert_eq!(server.state(), ConnectionState::Connected);
    assert_eq!(
        client.connected_peer().map(|p| p.address().to_string()),
        Some(server_addr.to_string())
    );

    client.send(b"ping".to_vec()).unwrap();
    assert_eq!(
        wait_for(&mut server_events, |e| matches!(e, Event::DataReceived { .. })).await,
        Event::DataReceived {
            bytes: b"ping".to_vec()
        }
    );
    wait_for(&mut client_events, |e| matches!(e, Event::DataSent { .. })).await;

    server.send(b"pong".to_vec()).unwrap();
    assert_eq!(
        wait_for(&mut client_events, |e| matches!(e, Event::DataReceived { .. })).await,
        Event::DataReceived {
            bytes: b"pong".to_vec()
        }
    );

    client.stop().await;
    wait_for(&mut server_events, |e| matches!(e, Event::ConnectionLost { .. })).await;
    wait_for(&mut server_events, |e| {
        *e == Event::state_changed(ConnectionState::Connected, ConnectionState::Listening)
    })
    .await;
    server.stop().await;
}

#[tokio::test]
async fn occupied_port_backs_off_then_gives_up() {
    let squatter = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = squatter.local_addr().unwrap();
    let config = ManagerConfig::default()
        .with_restart(RestartPolicy::default().with_listener_retry(Duration::from_millis(10), 3));
    let (manager, mut events) = ConnectionManager::new(TcpTransport::new(addr), config);

    manager.start().await.unwrap();
    let mut failures = 0;
    loop {
        match wait_for(&mut events, |_| true).await {
            Event::ConnectFailed {
                reason: ConnectFailure::Io(_),
            } => failures += 1,
            Event::StateChanged {
                old: ConnectionState::Listening,
                new: ConnectionState::Idle,
            } => break,
            Event::StateChanged { .. } => {}
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(failures, 4);
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert_eq!(manager.active_roles().count(), 0);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn occupied_port_does_not_spin_under_default_policy() {
    let squatter = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = squatter.local_addr().unwrap();
    let (manager, mut events) =
        ConnectionManager::new(TcpTransport::new(addr), ManagerConfig::default());

    manager.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let failures = events
        .drain()
        .iter()
        .filter(|e| matches!(e, Event::ConnectFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert_eq!(manager.state(), ConnectionState::Listening);
    manager.stop().await;
}
