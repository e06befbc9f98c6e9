//! End-to-end transport tests over real sockets on ephemeral ports.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use yomu_bridge::bridge::EventBridge;
use yomu_bridge::config::{HubConfig, TcpConfig, UdpConfig};
use yomu_bridge::event::NotificationEvent;
use yomu_bridge::hub::Hub;
use yomu_bridge::registry::{Registry, Transport};
use yomu_bridge::tcp::StreamListener;
use yomu_bridge::udp::DatagramListener;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

async fn wait_for_count(registry: &Registry, transport: Transport, expected: usize) {
    for _ in 0..200 {
        if registry.subscriber_count(transport).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber count did not reach {expected} within timeout");
}

fn loopback_udp_config() -> UdpConfig {
    UdpConfig {
        host: "127.0.0.1".into(),
        port: 0,
        max_datagram_bytes: 8192,
    }
}

fn loopback_tcp_config() -> TcpConfig {
    TcpConfig {
        host: "127.0.0.1".into(),
        port: 0,
        write_timeout_ms: 1000,
        send_buffer: 32,
    }
}

#[tokio::test]
async fn datagram_register_publish_unregister_roundtrip() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());
    let bridge = EventBridge::new(hub.clone());

    let listener = DatagramListener::bind(&loopback_udp_config(), hub.clone())
        .await
        .unwrap();
    let server_addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(hub.subscribe_stop()));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buf = [0u8; 8192];

    // REGISTER -> REGISTERED
    client.send_to(b"REGISTER", server_addr).await.unwrap();
    let (len, _) = timeout(RECV_TIMEOUT, client.recv_from(&mut buf))
        .await
        .expect("registration confirmation")
        .unwrap();
    assert_eq!(&buf[..len], b"REGISTERED");
    wait_for_count(&registry, Transport::Datagram, 1).await;

    // Publish -> exactly one chapter-progress datagram
    bridge.publish(NotificationEvent::chapter_progress(
        "alice",
        "Example Manga",
        5,
        "alice read Chapter 5 of Example Manga",
    ));
    let (len, _) = timeout(RECV_TIMEOUT, client.recv_from(&mut buf))
        .await
        .expect("notification datagram")
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(json["type"], "chapter-progress");
    assert_eq!(json["message"], "alice read Chapter 5 of Example Manga");

    // UNREGISTER -> UNREGISTERED
    client.send_to(b"UNREGISTER", server_addr).await.unwrap();
    let (len, _) = timeout(RECV_TIMEOUT, client.recv_from(&mut buf))
        .await
        .expect("unregistration confirmation")
        .unwrap();
    assert_eq!(&buf[..len], b"UNREGISTERED");
    wait_for_count(&registry, Transport::Datagram, 0).await;

    // A second publish produces no further datagram for this client
    bridge.publish(NotificationEvent::system_broadcast("nobody listening"));
    let result = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "no datagram after unregister");

    hub.stop().await;
}

#[tokio::test]
async fn unknown_datagram_command_gets_no_reply() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());

    let listener = DatagramListener::bind(&loopback_udp_config(), hub.clone())
        .await
        .unwrap();
    let server_addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(hub.subscribe_stop()));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"HELLO?", server_addr).await.unwrap();

    let mut buf = [0u8; 64];
    let result = timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "unknown commands are ignored silently");
    assert_eq!(registry.subscriber_count(Transport::Datagram).await, 0);

    hub.stop().await;
}

#[tokio::test]
async fn stream_connecting_is_registering_and_both_directions_work() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());
    let bridge = Arc::new(EventBridge::new(hub.clone()));

    let listener = StreamListener::bind(loopback_tcp_config(), hub.clone(), bridge.clone())
        .await
        .unwrap();
    let server_addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(hub.subscribe_stop()));

    let client = TcpStream::connect(server_addr).await.unwrap();
    wait_for_count(&registry, Transport::Stream, 1).await;

    let (read_half, mut write_half) = client.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Outbound: an event published on the server side arrives as one line
    bridge.publish(NotificationEvent::system_broadcast("hello stream"));
    let line = timeout(RECV_TIMEOUT, lines.next_line())
        .await
        .expect("broadcast line")
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(json["type"], "system-broadcast");

    // Inbound: a progress update on the wire flows through the bridge and
    // comes back as a chapter-progress broadcast
    write_half
        .write_all(b"{\"user_id\":\"bob\",\"manga_id\":\"One Example\",\"chapter\":3}\n")
        .await
        .unwrap();
    let line = timeout(RECV_TIMEOUT, lines.next_line())
        .await
        .expect("echoed progress broadcast")
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(json["type"], "chapter-progress");
    assert_eq!(json["chapter_number"], 3);

    // Malformed input is discarded without killing the connection
    write_half.write_all(b"not json\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.subscriber_count(Transport::Stream).await, 1);

    // Disconnecting is unregistering
    drop(write_half);
    drop(lines);
    wait_for_count(&registry, Transport::Stream, 0).await;

    hub.stop().await;
}
