use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::event::Identity;

/// Wire transport a subscriber handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Datagram,
    Stream,
    Duplex,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Datagram => "datagram",
            Transport::Stream => "stream",
            Transport::Duplex => "duplex",
        }
    }
}

/// A registered UDP subscriber: the source address of its REGISTER packet
/// plus the shared socket outbound datagrams go through.
#[derive(Clone)]
pub struct DatagramSubscriber {
    pub addr: SocketAddr,
    pub socket: Arc<UdpSocket>,
    pub registered_at: DateTime<Utc>,
}

impl DatagramSubscriber {
    pub fn new(addr: SocketAddr, socket: Arc<UdpSocket>) -> Self {
        Self {
            addr,
            socket,
            registered_at: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        self.addr.to_string()
    }
}

/// A registered TCP subscriber. The sender feeds the connection's writer
/// task; connecting is registering, so one of these exists per live socket.
#[derive(Clone)]
pub struct StreamSubscriber {
    pub peer: SocketAddr,
    pub sender: mpsc::Sender<String>,
    pub connected_at: DateTime<Utc>,
}

impl StreamSubscriber {
    pub fn new(peer: SocketAddr, sender: mpsc::Sender<String>) -> Self {
        Self {
            peer,
            sender,
            connected_at: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        self.peer.to_string()
    }
}

/// A WebSocket subscriber inside one room.
#[derive(Clone)]
pub struct RoomSubscriber {
    pub id: Uuid,
    pub identity: Identity,
    pub sender: mpsc::Sender<String>,
    pub joined_at: DateTime<Utc>,
}

impl RoomSubscriber {
    pub fn new(identity: Identity, sender: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            sender,
            joined_at: Utc::now(),
        }
    }

    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// A chat room: the duplex transport's partition unit. Created lazily on
/// first join; room lifecycle beyond that is owned by the persistence layer,
/// so rooms are never destroyed here.
pub struct Room {
    pub id: String,
    /// Optional binding to the series this room discusses
    pub manga_id: Option<String>,
    /// First joiner becomes owner
    pub owner: Identity,
    pub created_at: DateTime<Utc>,
    members: HashMap<String, RoomSubscriber>,
}

impl Room {
    fn new(id: String, manga_id: Option<String>, owner: Identity) -> Self {
        Self {
            id,
            manga_id,
            owner,
            created_at: Utc::now(),
            members: HashMap::new(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Handle submitted to the hub's register channel.
pub enum SubscriberHandle {
    Datagram(DatagramSubscriber),
    Stream(StreamSubscriber),
    Room {
        room_id: String,
        manga_id: Option<String>,
        subscriber: RoomSubscriber,
    },
}

impl SubscriberHandle {
    pub fn transport(&self) -> Transport {
        match self {
            SubscriberHandle::Datagram(_) => Transport::Datagram,
            SubscriberHandle::Stream(_) => Transport::Stream,
            SubscriberHandle::Room { .. } => Transport::Duplex,
        }
    }

    pub fn key(&self) -> String {
        match self {
            SubscriberHandle::Datagram(s) => s.key(),
            SubscriberHandle::Stream(s) => s.key(),
            SubscriberHandle::Room { subscriber, .. } => subscriber.key(),
        }
    }
}

/// Key submitted to the hub's unregister channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleKey {
    Datagram(String),
    Stream(String),
    Room { room_id: String, key: String },
}

impl HandleKey {
    pub fn transport(&self) -> Transport {
        match self {
            HandleKey::Datagram(_) => Transport::Datagram,
            HandleKey::Stream(_) => Transport::Stream,
            HandleKey::Room { .. } => Transport::Duplex,
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    datagram: HashMap<String, DatagramSubscriber>,
    stream: HashMap<String, StreamSubscriber>,
    rooms: HashMap<String, Room>,
}

/// All subscriber state, every transport.
///
/// Mutation is reserved for the hub loop (single writer); the lock exists so
/// other tasks can take cheap read guards for diagnostics while the loop
/// runs. Nothing outside the hub ever takes a write guard.
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Insert (or silently overwrite) a handle. Returns the transport's new
    /// subscriber count. Hub loop only.
    pub(crate) async fn register(&self, handle: SubscriberHandle) -> usize {
        let mut inner = self.inner.write().await;
        match handle {
            SubscriberHandle::Datagram(sub) => {
                inner.datagram.insert(sub.key(), sub);
                inner.datagram.len()
            }
            SubscriberHandle::Stream(sub) => {
                inner.stream.insert(sub.key(), sub);
                inner.stream.len()
            }
            SubscriberHandle::Room {
                room_id,
                manga_id,
                subscriber,
            } => {
                let room = inner.rooms.entry(room_id.clone()).or_insert_with(|| {
                    tracing::debug!(room_id = %room_id, "Room created lazily on first join");
                    Room::new(room_id.clone(), manga_id, subscriber.identity.clone())
                });
                room.members.insert(subscriber.key(), subscriber);
                room.member_count()
            }
        }
    }

    /// Remove a handle if present; absence is a no-op. Returns whether a
    /// handle was actually removed. Hub loop only.
    pub(crate) async fn unregister(&self, key: &HandleKey) -> bool {
        let mut inner = self.inner.write().await;
        match key {
            HandleKey::Datagram(k) => inner.datagram.remove(k).is_some(),
            HandleKey::Stream(k) => inner.stream.remove(k).is_some(),
            HandleKey::Room { room_id, key } => inner
                .rooms
                .get_mut(room_id)
                .map(|room| room.members.remove(key).is_some())
                .unwrap_or(false),
        }
    }

    pub(crate) async fn datagram_snapshot(&self) -> Vec<DatagramSubscriber> {
        self.inner.read().await.datagram.values().cloned().collect()
    }

    pub(crate) async fn stream_snapshot(&self) -> Vec<StreamSubscriber> {
        self.inner.read().await.stream.values().cloned().collect()
    }

    /// Every duplex subscriber across all rooms, paired with its room id so
    /// fan-out can prune closed members.
    pub(crate) async fn duplex_snapshot(&self) -> Vec<(String, RoomSubscriber)> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .values()
            .flat_map(|room| {
                room.members
                    .values()
                    .map(|m| (room.id.clone(), m.clone()))
            })
            .collect()
    }

    pub(crate) async fn room_snapshot(&self, room_id: &str) -> Vec<RoomSubscriber> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .map(|room| room.members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Diagnostic read: subscriber count for one transport.
    pub async fn subscriber_count(&self, transport: Transport) -> usize {
        let inner = self.inner.read().await;
        match transport {
            Transport::Datagram => inner.datagram.len(),
            Transport::Stream => inner.stream.len(),
            Transport::Duplex => inner.rooms.values().map(Room::member_count).sum(),
        }
    }

    /// Diagnostic read: live member count of one room (0 if it does not
    /// exist yet).
    pub async fn room_member_count(&self, room_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room_id)
            .map(Room::member_count)
            .unwrap_or(0)
    }

    /// Diagnostic snapshot served by GET /stats.
    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        let rooms = inner
            .rooms
            .values()
            .map(|room| {
                (
                    room.id.clone(),
                    RoomStats {
                        members: room.member_count(),
                        manga_id: room.manga_id.clone(),
                        owner: room.owner.display_name(),
                    },
                )
            })
            .collect();

        RegistryStats {
            datagram_subscribers: inner.datagram.len(),
            stream_subscribers: inner.stream.len(),
            duplex_subscribers: inner.rooms.values().map(Room::member_count).sum(),
            rooms,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub datagram_subscribers: usize,
    pub stream_subscribers: usize,
    pub duplex_subscribers: usize,
    pub rooms: HashMap<String, RoomStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub members: usize,
    pub manga_id: Option<String>,
    pub owner: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_handle(port: u16) -> (SubscriberHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let peer: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        (
            SubscriberHandle::Stream(StreamSubscriber::new(peer, tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn register_is_idempotent_per_key() {
        let registry = Registry::new();
        let (h1, _rx1) = stream_handle(9001);
        let (h2, _rx2) = stream_handle(9001);

        assert_eq!(registry.register(h1).await, 1);
        // Same peer again: silent overwrite, size unchanged
        assert_eq!(registry.register(h2).await, 1);
        assert_eq!(registry.subscriber_count(Transport::Stream).await, 1);
    }

    #[tokio::test]
    async fn unregister_absent_key_is_noop() {
        let registry = Registry::new();
        let removed = registry
            .unregister(&HandleKey::Stream("127.0.0.1:9999".into()))
            .await;
        assert!(!removed);
    }

    #[tokio::test]
    async fn room_created_lazily_with_first_joiner_as_owner() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel(8);
        let sub = RoomSubscriber::new(
            Identity::Authenticated {
                user_id: "alice".into(),
            },
            tx,
        );

        registry
            .register(SubscriberHandle::Room {
                room_id: "manga-42".into(),
                manga_id: Some("42".into()),
                subscriber: sub,
            })
            .await;

        let stats = registry.stats().await;
        let room = &stats.rooms["manga-42"];
        assert_eq!(room.members, 1);
        assert_eq!(room.owner, "alice");
        assert_eq!(room.manga_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn rooms_partition_members() {
        let registry = Registry::new();
        for room in ["a", "b"] {
            let (tx, _rx) = mpsc::channel(8);
            registry
                .register(SubscriberHandle::Room {
                    room_id: room.into(),
                    manga_id: None,
                    subscriber: RoomSubscriber::new(Identity::anonymous(), tx),
                })
                .await;
        }

        assert_eq!(registry.room_member_count("a").await, 1);
        assert_eq!(registry.room_member_count("b").await, 1);
        assert_eq!(registry.room_snapshot("a").await.len(), 1);
        assert_eq!(registry.subscriber_count(Transport::Duplex).await, 2);
    }
}
