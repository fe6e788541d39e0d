//! Deterministic link state-machine tests over the mock transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use common::{next_event, wait_for_event, wait_for_status};
use trailtalk_daemon::config::Config;
use trailtalk_daemon::{Daemon, DaemonStatus, LinkEvent, LinkHandle};
use trailtalk_discovery::mock::{MockDiscovery, MockDiscoveryHandle};
use trailtalk_discovery::Peer;
use trailtalk_protocol::mock::{MockConnect, MockTransport, MockTransportHandle};
use trailtalk_types::PeerId;

#[allow(dead_code)]
struct TestLink {
    handle: LinkHandle,
    events: mpsc::Receiver<LinkEvent>,
    status: watch::Receiver<DaemonStatus>,
    transport: MockTransportHandle,
    discovery: MockDiscoveryHandle,
    task: tokio::task::JoinHandle<()>,
}

async fn spawn_link() -> TestLink {
    let mut config = Config::default();
    config.identity.name = "local".to_string();

    let (transport, transport_handle) = MockTransport::new();
    let (discovery, discovery_handle) = MockDiscovery::new();
    let (link_tx, link_rx) = mpsc::channel(256);

    let mut daemon = Daemon::new(
        config,
        PeerId::new(),
        Arc::new(transport),
        Box::new(discovery),
        link_tx,
    );
    let handle = daemon.handle();
    let status = daemon.status_receiver();
    let task = tokio::spawn(async move {
        let _ = daemon.run().await;
    });

    TestLink {
        handle,
        events: link_rx,
        status,
        transport: transport_handle,
        discovery: discovery_handle,
        task,
    }
}

fn test_peer(name: &str, addr: &str) -> Peer {
    Peer {
        id: PeerId::new(),
        name: name.to_string(),
        address: addr.parse().unwrap(),
    }
}

#[tokio::test]
async fn test_dial_supersession_only_second_peer_observed() {
    let mut link = spawn_link().await;

    let peer_x = test_peer("peer-x", "10.0.0.1:1000");
    let peer_b = test_peer("peer-b", "10.0.0.2:1000");
    link.transport.on_connect(peer_x.address, MockConnect::Hang);
    link.transport.on_connect(peer_b.address, MockConnect::Accept);

    link.handle.connect_to_peer(peer_x.clone()).await.unwrap();
    link.handle.connect_to_peer(peer_b.clone()).await.unwrap();

    let connected = wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::PeerConnected(_))
    })
    .await;
    assert_eq!(connected, LinkEvent::PeerConnected(peer_b));

    // Nothing referencing the superseded attempt ever surfaces.
    while let Some(event) = next_event(&mut link.events, Duration::from_millis(300)).await {
        match &event {
            LinkEvent::PeerConnected(peer) => assert_ne!(peer.id, peer_x.id),
            LinkEvent::ConnectionError { message } => {
                assert!(!message.contains("peer-x"), "event for cancelled dial: {message}");
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_promotion_closes_previous_session() {
    let mut link = spawn_link().await;

    link.handle.start_discovery().await.unwrap();
    wait_for_status(&mut link.status, Duration::from_secs(5), |s| s.listening)
        .await
        .expect("rendezvous should open");

    let mut first = link
        .transport
        .inject_inbound("10.0.0.9:5555".parse().unwrap())
        .await
        .expect("rendezvous should accept");
    wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::PeerConnected(_))
    })
    .await;

    // A new dial replaces the inbound session.
    let peer_c = test_peer("peer-c", "10.0.0.3:1000");
    link.transport.on_connect(peer_c.address, MockConnect::Accept);
    link.handle.connect_to_peer(peer_c.clone()).await.unwrap();

    let connected = wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::PeerConnected(_))
    })
    .await;
    assert_eq!(connected, LinkEvent::PeerConnected(peer_c));

    // The replaced session's stream is closed.
    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), first.read_to_end(&mut buf))
        .await
        .expect("replaced stream should close")
        .unwrap();

    // Replacement is deliberate: it raises no Disconnected.
    while let Some(event) = next_event(&mut link.events, Duration::from_millis(300)).await {
        assert_ne!(event, LinkEvent::Disconnected);
    }
}

#[tokio::test]
async fn test_session_end_raises_one_disconnect() {
    let mut link = spawn_link().await;

    link.handle.start_discovery().await.unwrap();
    wait_for_status(&mut link.status, Duration::from_secs(5), |s| s.listening)
        .await
        .unwrap();

    let mut remote = link
        .transport
        .inject_inbound("10.0.0.9:5555".parse().unwrap())
        .await
        .expect("rendezvous should accept");
    wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::PeerConnected(_))
    })
    .await;

    remote.write_all(b"hello\n").await.unwrap();
    let chat = wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::Chat { .. })
    })
    .await;
    assert_eq!(
        chat,
        LinkEvent::Chat {
            text: "hello".to_string(),
        }
    );

    drop(remote);

    let disconnected = wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::Disconnected)
    })
    .await;
    assert_eq!(disconnected, LinkEvent::Disconnected);

    while let Some(event) = next_event(&mut link.events, Duration::from_millis(300)).await {
        assert_ne!(event, LinkEvent::Disconnected, "second Disconnected observed");
    }

    let status = wait_for_status(&mut link.status, Duration::from_secs(5), |s| {
        !s.phase.is_connected()
    })
    .await
    .unwrap();
    assert!(status.connected_to.is_none());
}

#[tokio::test]
async fn test_malformed_frames_tolerated() {
    let mut link = spawn_link().await;

    link.handle.start_discovery().await.unwrap();
    wait_for_status(&mut link.status, Duration::from_secs(5), |s| s.listening)
        .await
        .unwrap();

    let mut remote = link
        .transport
        .inject_inbound("10.0.0.9:5555".parse().unwrap())
        .await
        .expect("rendezvous should accept");
    wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::PeerConnected(_))
    })
    .await;

    // Too few fields: dropped, no event, loop survives.
    remote.write_all(b"FRIEND_REQUEST:u1\n").await.unwrap();
    assert!(next_event(&mut link.events, Duration::from_millis(300)).await.is_none());

    // Extra fields beyond the third are ignored.
    remote
        .write_all(b"FRIEND_REQUEST:u1:Ann:extra\n")
        .await
        .unwrap();
    let request = wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::FriendRequest { .. })
    })
    .await;
    assert_eq!(
        request,
        LinkEvent::FriendRequest {
            user_id: "u1".to_string(),
            user_name: "Ann".to_string(),
        }
    );

    // Plain text still flows afterwards.
    remote.write_all(b"made it to camp\n").await.unwrap();
    let chat = wait_for_event(&mut link.events, Duration::from_secs(5), |e| {
        matches!(e, LinkEvent::Chat { .. })
    })
    .await;
    assert_eq!(
        chat,
        LinkEvent::Chat {
            text: "made it to camp".to_string(),
        }
    );
}

#[tokio::test]
async fn test_cancelled_rendezvous_discards_late_inbound() {
    let mut link = spawn_link().await;

    link.handle.start_discovery().await.unwrap();
    wait_for_status(&mut link.status, Duration::from_secs(5), |s| s.listening)
        .await
        .unwrap();

    // Dialing out cancels the rendezvous.
    let peer_x = test_peer("peer-x", "10.0.0.1:1000");
    link.transport.on_connect(peer_x.address, MockConnect::Hang);
    link.handle.connect_to_peer(peer_x).await.unwrap();
    wait_for_status(&mut link.status, Duration::from_secs(5), |s| !s.listening)
        .await
        .expect("rendezvous should be cancelled");

    // An inbound connection can no longer land.
    assert!(link
        .transport
        .inject_inbound("10.0.0.9:5555".parse().unwrap())
        .await
        .is_none());

    while let Some(event) = next_event(&mut link.events, Duration::from_millis(300)).await {
        assert!(
            !matches!(event, LinkEvent::PeerConnected(_)),
            "session from cancelled rendezvous"
        );
    }
}

#[tokio::test]
async fn test_chat_without_session_is_dropped() {
    let mut link = spawn_link().await;

    link.handle.send_chat_message("into the void").await.unwrap();
    assert!(next_event(&mut link.events, Duration::from_millis(300)).await.is_none());

    // The daemon is still responsive afterwards.
    link.handle.start_discovery().await.unwrap();
    wait_for_status(&mut link.status, Duration::from_secs(5), |s| s.listening)
        .await
        .expect("daemon should still accept commands");
}
