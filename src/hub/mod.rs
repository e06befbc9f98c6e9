//! The broadcast hub: one event loop that owns all subscriber-state mutation
//! and all fan-out.
//!
//! Listeners are producers on three inbound channels (register, unregister,
//! broadcast); the loop is the sole consumer and the registry's only writer,
//! so the hot path needs no locking beyond the registry's read guards. The
//! broadcast channel is bounded and producers drop on overflow: notifications
//! are advisory, so the hub favors freshness over completeness.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::HubConfig;
use crate::event::NotificationEvent;
use crate::metrics;
use crate::registry::{HandleKey, Registry, SubscriberHandle, Transport};
use crate::ws::RoomFrame;

/// A broadcast submitted to the hub.
pub enum BroadcastRequest {
    /// Canonical event, fanned out on every transport
    Event(NotificationEvent),
    /// Chat frame, fanned out to one room's duplex subscribers only
    Room { room_id: String, frame: RoomFrame },
}

/// Hub lifecycle. `Stopped` is terminal; the hub never resurrects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HubState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl HubState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HubState::Created,
            1 => HubState::Running,
            2 => HubState::Stopping,
            _ => HubState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HubState::Created => "created",
            HubState::Running => "running",
            HubState::Stopping => "stopping",
            HubState::Stopped => "stopped",
        }
    }
}

pub struct Hub {
    registry: Arc<Registry>,
    register_tx: mpsc::Sender<SubscriberHandle>,
    unregister_tx: mpsc::Sender<HandleKey>,
    broadcast_tx: mpsc::Sender<BroadcastRequest>,
    stop_tx: broadcast::Sender<()>,
    state: Arc<AtomicU8>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Hub {
    /// Wire up channels and state without starting the loop (`Created`).
    fn build(registry: Arc<Registry>, config: &HubConfig) -> (Self, HubLoop) {
        let (register_tx, register_rx) = mpsc::channel(config.control_queue_depth);
        let (unregister_tx, unregister_rx) = mpsc::channel(config.control_queue_depth);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_queue_depth);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let state = Arc::new(AtomicU8::new(HubState::Created as u8));

        let hub_loop = HubLoop {
            registry: registry.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            stop_rx,
            state: state.clone(),
        };

        let hub = Self {
            registry,
            register_tx,
            unregister_tx,
            broadcast_tx,
            stop_tx,
            state,
            loop_handle: Mutex::new(None),
        };
        (hub, hub_loop)
    }

    /// Spawn the hub loop and return a handle to it. The hub transitions to
    /// `Running`; listeners should be started after this so their stop
    /// receivers observe the same signal.
    pub fn spawn(registry: Arc<Registry>, config: &HubConfig) -> Arc<Self> {
        let (mut hub, hub_loop) = Self::build(registry, config);
        let handle = tokio::spawn(hub_loop.run());
        hub.state.store(HubState::Running as u8, Ordering::SeqCst);
        hub.loop_handle = Mutex::new(Some(handle));
        Arc::new(hub)
    }

    pub fn state(&self) -> HubState {
        HubState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == HubState::Running
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Stop receiver for listener tasks.
    pub fn subscribe_stop(&self) -> broadcast::Receiver<()> {
        self.stop_tx.subscribe()
    }

    /// Submit a registration. Never fails; a duplicate key silently
    /// overwrites. No-op once the hub is no longer running.
    pub async fn register(&self, handle: SubscriberHandle) {
        if !self.is_running() {
            tracing::debug!(
                transport = handle.transport().as_str(),
                "Register ignored, hub not running"
            );
            return;
        }
        if self.register_tx.send(handle).await.is_err() {
            tracing::debug!("Register dropped, hub loop gone");
        }
    }

    /// Submit an unregistration. Removing an absent key is a no-op.
    pub async fn unregister(&self, key: HandleKey) {
        if self.unregister_tx.send(key).await.is_err() {
            tracing::debug!("Unregister dropped, hub loop gone");
        }
    }

    /// Submit a broadcast without blocking. Returns false when the event was
    /// dropped: queue full (deliberate backpressure policy) or hub stopped.
    pub fn broadcast(&self, request: BroadcastRequest) -> bool {
        if !self.is_running() {
            tracing::debug!("Broadcast ignored, hub not running");
            return false;
        }
        match self.broadcast_tx.try_send(request) {
            Ok(()) => {
                metrics::EVENTS_BROADCAST.inc();
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::EVENTS_DROPPED.inc();
                tracing::warn!("Broadcast queue full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Broadcast dropped, hub loop gone");
                false
            }
        }
    }

    /// Stop the hub loop. Idempotent; after the first call completes the hub
    /// is `Stopped` and register/broadcast become no-ops.
    pub async fn stop(&self) {
        if self
            .state
            .compare_exchange(
                HubState::Running as u8,
                HubState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        tracing::info!("Hub stopping");
        let _ = self.stop_tx.send(());

        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }

        self.state.store(HubState::Stopped as u8, Ordering::SeqCst);
        tracing::info!("Hub stopped");
    }
}

struct HubLoop {
    registry: Arc<Registry>,
    register_rx: mpsc::Receiver<SubscriberHandle>,
    unregister_rx: mpsc::Receiver<HandleKey>,
    broadcast_rx: mpsc::Receiver<BroadcastRequest>,
    stop_rx: broadcast::Receiver<()>,
    state: Arc<AtomicU8>,
}

impl HubLoop {
    async fn run(mut self) {
        tracing::info!("Hub loop started");

        loop {
            tokio::select! {
                _ = self.stop_rx.recv() => {
                    tracing::debug!("Hub loop received stop signal");
                    break;
                }
                Some(handle) = self.register_rx.recv() => {
                    self.handle_register(handle).await;
                }
                Some(key) = self.unregister_rx.recv() => {
                    self.handle_unregister(key).await;
                }
                Some(request) = self.broadcast_rx.recv() => {
                    self.deliver(request).await;
                }
                else => break,
            }
        }

        self.state.store(HubState::Stopped as u8, Ordering::SeqCst);
        tracing::info!("Hub loop exited");
    }

    async fn handle_register(&self, handle: SubscriberHandle) {
        let transport = handle.transport();
        let key = handle.key();
        let count = self.registry.register(handle).await;

        metrics::SUBSCRIBERS_REGISTERED
            .with_label_values(&[transport.as_str()])
            .inc();
        tracing::debug!(
            transport = transport.as_str(),
            key = %key,
            subscribers = count,
            "Subscriber registered"
        );
    }

    async fn handle_unregister(&self, key: HandleKey) {
        let transport = key.transport();
        if self.registry.unregister(&key).await {
            metrics::SUBSCRIBERS_UNREGISTERED
                .with_label_values(&[transport.as_str()])
                .inc();
            tracing::debug!(
                transport = transport.as_str(),
                key = ?key,
                "Subscriber unregistered"
            );
        }
    }

    async fn deliver(&self, request: BroadcastRequest) {
        match request {
            BroadcastRequest::Event(event) => self.deliver_event(event).await,
            BroadcastRequest::Room { room_id, frame } => {
                self.deliver_room(&room_id, &frame).await
            }
        }
    }

    /// Fan an event out on every transport. Serialized once per transport;
    /// one failed subscriber never aborts delivery to the rest.
    async fn deliver_event(&self, event: NotificationEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event, broadcast skipped");
                return;
            }
        };

        self.deliver_datagram(&payload).await;
        self.deliver_stream(&payload).await;
        self.deliver_duplex(&payload).await;
    }

    async fn deliver_datagram(&self, payload: &str) {
        let subscribers = self.registry.datagram_snapshot().await;
        let mut delivered = 0u64;
        let mut failed = 0u64;

        for sub in &subscribers {
            match sub.socket.try_send_to(payload.as_bytes(), sub.addr) {
                Ok(_) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        addr = %sub.addr,
                        error = %e,
                        "Datagram delivery failed, continuing with remaining subscribers"
                    );
                }
            }
        }

        self.record_delivery(Transport::Datagram, delivered, failed);
    }

    async fn deliver_stream(&self, payload: &str) {
        let subscribers = self.registry.stream_snapshot().await;
        let mut delivered = 0u64;
        let mut failed = 0u64;
        let mut stale = Vec::new();

        for sub in &subscribers {
            match sub.sender.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    failed += 1;
                    tracing::warn!(peer = %sub.peer, "Stream subscriber send buffer full, event dropped for it");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    failed += 1;
                    stale.push(HandleKey::Stream(sub.key()));
                }
            }
        }

        self.prune(stale).await;
        self.record_delivery(Transport::Stream, delivered, failed);
    }

    async fn deliver_duplex(&self, payload: &str) {
        let subscribers = self.registry.duplex_snapshot().await;
        let mut delivered = 0u64;
        let mut failed = 0u64;
        let mut stale = Vec::new();

        for (room_id, sub) in &subscribers {
            match sub.sender.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    failed += 1;
                    tracing::warn!(room_id = %room_id, member = %sub.key(), "Duplex subscriber send buffer full, event dropped for it");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    failed += 1;
                    stale.push(HandleKey::Room {
                        room_id: room_id.clone(),
                        key: sub.key(),
                    });
                }
            }
        }

        self.prune(stale).await;
        self.record_delivery(Transport::Duplex, delivered, failed);
    }

    /// Fan a chat frame out to one room only.
    async fn deliver_room(&self, room_id: &str, frame: &RoomFrame) {
        let payload = match serde_json::to_string(frame) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize room frame, broadcast skipped");
                return;
            }
        };

        let members = self.registry.room_snapshot(room_id).await;
        let mut delivered = 0u64;
        let mut failed = 0u64;
        let mut stale = Vec::new();

        for member in &members {
            match member.sender.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    failed += 1;
                    tracing::warn!(room_id = %room_id, member = %member.key(), "Room member send buffer full, frame dropped for it");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    failed += 1;
                    stale.push(HandleKey::Room {
                        room_id: room_id.to_string(),
                        key: member.key(),
                    });
                }
            }
        }

        self.prune(stale).await;
        self.record_delivery(Transport::Duplex, delivered, failed);
    }

    /// Remove handles whose connection channel closed underneath us. The
    /// loop is the only writer, so pruning mid-broadcast is safe.
    async fn prune(&self, stale: Vec<HandleKey>) {
        for key in stale {
            tracing::debug!(key = ?key, "Pruning handle with closed channel");
            self.handle_unregister(key).await;
        }
    }

    fn record_delivery(&self, transport: Transport, delivered: u64, failed: u64) {
        if delivered > 0 {
            metrics::DELIVERIES
                .with_label_values(&[transport.as_str()])
                .inc_by(delivered);
        }
        if failed > 0 {
            metrics::DELIVERY_FAILURES
                .with_label_values(&[transport.as_str()])
                .inc_by(failed);
        }
    }
}
