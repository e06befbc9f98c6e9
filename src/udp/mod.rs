//! Datagram listener: a minimal text control protocol straight on UDP.
//!
//! The listener keeps no connection state of its own; the registry holds the
//! only record of who is subscribed. Wire contract:
//!
//! - `REGISTER`            -> source address recorded, reply `REGISTERED`
//! - `UNREGISTER`          -> source address removed, reply `UNREGISTERED`
//! - `BROADCAST <json>`    -> parsed as a NotificationEvent and submitted to
//!                            the hub (internal use; not a hardened ingress)
//! - anything else         -> warn log, no reply
//!
//! Outbound notifications are raw JSON datagrams, best effort.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use crate::config::UdpConfig;
use crate::error::Result;
use crate::event::NotificationEvent;
use crate::hub::{BroadcastRequest, Hub};
use crate::registry::{DatagramSubscriber, HandleKey, SubscriberHandle};

const CMD_REGISTER: &str = "REGISTER";
const CMD_UNREGISTER: &str = "UNREGISTER";
const CMD_BROADCAST: &str = "BROADCAST ";
const REPLY_REGISTERED: &[u8] = b"REGISTERED";
const REPLY_UNREGISTERED: &[u8] = b"UNREGISTERED";

pub struct DatagramListener {
    socket: Arc<UdpSocket>,
    hub: Arc<Hub>,
    max_datagram_bytes: usize,
}

impl DatagramListener {
    pub async fn bind(config: &UdpConfig, hub: Arc<Hub>) -> Result<Self> {
        let socket = UdpSocket::bind(config.addr()).await?;
        let local = socket.local_addr()?;
        tracing::info!(addr = %local, "Datagram listener bound");

        Ok(Self {
            socket: Arc::new(socket),
            hub,
            max_datagram_bytes: config.max_datagram_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Read loop. Exits silently when the stop signal fires; read errors
    /// while running are logged and the loop continues.
    pub async fn run(self, mut stop_rx: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; self.max_datagram_bytes];

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    tracing::debug!("Datagram listener stopping");
                    break;
                }
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => self.handle_packet(&buf[..len], addr).await,
                        Err(e) => {
                            tracing::error!(error = %e, "Datagram read error, continuing");
                        }
                    }
                }
            }
        }
    }

    async fn handle_packet(&self, payload: &[u8], addr: SocketAddr) {
        let text = match std::str::from_utf8(payload) {
            Ok(t) => t.trim(),
            Err(_) => {
                tracing::warn!(addr = %addr, "Non-UTF8 datagram ignored");
                return;
            }
        };

        if text == CMD_REGISTER {
            self.hub
                .register(SubscriberHandle::Datagram(DatagramSubscriber::new(
                    addr,
                    self.socket.clone(),
                )))
                .await;
            self.reply(REPLY_REGISTERED, addr).await;
        } else if text == CMD_UNREGISTER {
            self.hub
                .unregister(HandleKey::Datagram(addr.to_string()))
                .await;
            self.reply(REPLY_UNREGISTERED, addr).await;
        } else if let Some(json) = text.strip_prefix(CMD_BROADCAST) {
            match serde_json::from_str::<NotificationEvent>(json) {
                Ok(event) => {
                    self.hub.broadcast(BroadcastRequest::Event(event));
                }
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "Malformed BROADCAST payload discarded");
                }
            }
        } else {
            tracing::warn!(addr = %addr, payload = %text, "Unknown datagram command ignored");
        }
    }

    async fn reply(&self, payload: &[u8], addr: SocketAddr) {
        if let Err(e) = self.socket.send_to(payload, addr).await {
            tracing::warn!(addr = %addr, error = %e, "Failed to send datagram reply");
        }
    }
}
