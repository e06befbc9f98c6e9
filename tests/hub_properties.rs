//! Delivery-semantics tests for the broadcast hub, exercised through the
//! public API only: registration idempotence, unregister-then-broadcast,
//! per-subscriber isolation, and per-transport ordering.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use yomu_bridge::config::HubConfig;
use yomu_bridge::event::NotificationEvent;
use yomu_bridge::hub::{BroadcastRequest, Hub, HubState};
use yomu_bridge::registry::{
    HandleKey, Registry, StreamSubscriber, SubscriberHandle, Transport,
};

async fn wait_for_count(registry: &Registry, transport: Transport, expected: usize) {
    for _ in 0..200 {
        if registry.subscriber_count(transport).await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber count did not reach {expected} within timeout");
}

fn stream_handle(port: u16, buffer: usize) -> (SubscriberHandle, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(buffer);
    let peer = format!("127.0.0.1:{port}").parse().unwrap();
    (SubscriberHandle::Stream(StreamSubscriber::new(peer, tx)), rx)
}

#[tokio::test]
async fn registering_the_same_handle_twice_keeps_set_size_one() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());

    let (h1, _rx1) = stream_handle(7001, 8);
    let (h2, _rx2) = stream_handle(7001, 8);
    hub.register(h1).await;
    hub.register(h2).await;

    wait_for_count(&registry, Transport::Stream, 1).await;

    // Give the loop a moment; the count must stay at one
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.subscriber_count(Transport::Stream).await, 1);

    hub.stop().await;
}

#[tokio::test]
async fn unregistered_handle_never_receives_a_later_broadcast() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());

    let (handle, mut rx) = stream_handle(7002, 8);
    hub.register(handle).await;
    wait_for_count(&registry, Transport::Stream, 1).await;

    hub.unregister(HandleKey::Stream("127.0.0.1:7002".into())).await;
    wait_for_count(&registry, Transport::Stream, 0).await;

    hub.broadcast(BroadcastRequest::Event(NotificationEvent::system_broadcast(
        "after unregister",
    )));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "no delivery after unregister");

    hub.stop().await;
}

#[tokio::test]
async fn failed_delivery_to_one_subscriber_does_not_affect_others() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());

    let (handle_a, rx_a) = stream_handle(7003, 8);
    let (handle_b, mut rx_b) = stream_handle(7004, 8);
    hub.register(handle_a).await;
    hub.register(handle_b).await;
    wait_for_count(&registry, Transport::Stream, 2).await;

    // Simulate a transport failure for A: its connection channel is gone
    drop(rx_a);

    hub.broadcast(BroadcastRequest::Event(NotificationEvent::system_broadcast(
        "isolation check",
    )));

    let payload = timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .expect("B should still receive the event")
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["type"], "system-broadcast");

    hub.stop().await;
}

#[tokio::test]
async fn events_arrive_in_broadcast_order_per_subscriber() {
    let registry = Arc::new(Registry::new());
    let hub = Hub::spawn(registry.clone(), &HubConfig::default());

    let (handle, mut rx) = stream_handle(7005, 32);
    hub.register(handle).await;
    wait_for_count(&registry, Transport::Stream, 1).await;

    hub.broadcast(BroadcastRequest::Event(NotificationEvent::system_broadcast("E1")));
    hub.broadcast(BroadcastRequest::Event(NotificationEvent::system_broadcast("E2")));

    let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(first["message"], "E1");
    assert_eq!(second["message"], "E2");

    hub.stop().await;
}

#[tokio::test]
async fn stop_transitions_to_terminal_state() {
    let hub = Hub::spawn(Arc::new(Registry::new()), &HubConfig::default());
    assert_eq!(hub.state(), HubState::Running);

    hub.stop().await;
    assert_eq!(hub.state(), HubState::Stopped);

    // Terminal: further operations are no-ops, a second stop changes nothing
    hub.stop().await;
    assert_eq!(hub.state(), HubState::Stopped);
    assert!(!hub.broadcast(BroadcastRequest::Event(
        NotificationEvent::system_broadcast("ignored")
    )));
}
