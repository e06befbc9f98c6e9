//! Stream listener: persistent TCP connections, newline-delimited JSON.
//!
//! Connecting is registering; EOF or a read error unregisters. Inbound lines
//! are domain progress updates forwarded through the same bridge the CRUD
//! path uses, so updates can originate from either surface. Outbound events
//! go through a per-connection writer task whose writes carry a timeout, so
//! a slow reader only stalls its own connection, never the hub loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{tcp::OwnedWriteHalf, TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use crate::bridge::EventBridge;
use crate::config::TcpConfig;
use crate::error::Result;
use crate::event::NotificationEvent;
use crate::hub::Hub;
use crate::registry::{HandleKey, StreamSubscriber, SubscriberHandle};

/// Inbound domain payload: one JSON object per line.
#[derive(Debug, Deserialize)]
pub struct ProgressUpdate {
    pub user_id: String,
    pub manga_id: String,
    pub chapter: u32,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProgressUpdate {
    fn into_event(self) -> NotificationEvent {
        let message = format!(
            "{} read Chapter {} of {}",
            self.user_id, self.chapter, self.manga_id
        );
        let mut event =
            NotificationEvent::chapter_progress(self.user_id, self.manga_id, self.chapter, message);
        if let Some(ts) = self.timestamp {
            event.occurred_at = ts;
        }
        event
    }
}

pub struct StreamListener {
    listener: TcpListener,
    hub: Arc<Hub>,
    bridge: Arc<EventBridge>,
    config: TcpConfig,
}

impl StreamListener {
    pub async fn bind(config: TcpConfig, hub: Arc<Hub>, bridge: Arc<EventBridge>) -> Result<Self> {
        let listener = TcpListener::bind(config.addr()).await?;
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "Stream listener bound");

        Ok(Self {
            listener,
            hub,
            bridge,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Each accepted connection gets its own reader and writer
    /// tasks; the loop itself exits on the stop signal.
    pub async fn run(self, mut stop_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    tracing::debug!("Stream listener stopping");
                    break;
                }
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer)) => {
                            let conn = StreamConnection {
                                hub: self.hub.clone(),
                                bridge: self.bridge.clone(),
                                peer,
                                write_timeout: Duration::from_millis(self.config.write_timeout_ms),
                                send_buffer: self.config.send_buffer,
                            };
                            let stop = self.hub.subscribe_stop();
                            tokio::spawn(conn.handle(socket, stop));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept stream connection");
                        }
                    }
                }
            }
        }
    }
}

struct StreamConnection {
    hub: Arc<Hub>,
    bridge: Arc<EventBridge>,
    peer: SocketAddr,
    write_timeout: Duration,
    send_buffer: usize,
}

impl StreamConnection {
    async fn handle(self, socket: TcpStream, mut stop_rx: broadcast::Receiver<()>) {
        let (read_half, write_half) = socket.into_split();
        let (tx, rx) = mpsc::channel::<String>(self.send_buffer);

        // Connecting is registering
        self.hub
            .register(SubscriberHandle::Stream(StreamSubscriber::new(
                self.peer, tx,
            )))
            .await;
        tracing::info!(peer = %self.peer, "Stream connection established");

        let writer = tokio::spawn(Self::write_loop(write_half, rx, self.peer, self.write_timeout));

        let mut lines = BufReader::new(read_half).lines();
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => self.handle_line(&line),
                        Ok(None) => {
                            tracing::debug!(peer = %self.peer, "Stream connection closed by peer");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(peer = %self.peer, error = %e, "Stream read error");
                            break;
                        }
                    }
                }
            }
        }

        // Disconnection is unregistering; the registry entry holds the only
        // sender, so the writer's channel closes once the hub processes this.
        self.hub
            .unregister(HandleKey::Stream(self.peer.to_string()))
            .await;
        let _ = writer.await;
        tracing::info!(peer = %self.peer, "Stream connection closed");
    }

    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<ProgressUpdate>(line) {
            Ok(update) => {
                tracing::debug!(
                    peer = %self.peer,
                    user_id = %update.user_id,
                    manga_id = %update.manga_id,
                    chapter = update.chapter,
                    "Progress update received on stream transport"
                );
                self.bridge.publish(update.into_event());
            }
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Malformed stream payload discarded");
            }
        }
    }

    /// Drain the connection's outbound channel onto the socket, one JSON
    /// line per event. A timed-out or failed write kills this connection
    /// only.
    async fn write_loop(
        mut write_half: OwnedWriteHalf,
        mut rx: mpsc::Receiver<String>,
        peer: SocketAddr,
        write_timeout: Duration,
    ) {
        while let Some(payload) = rx.recv().await {
            let frame = format!("{payload}\n");
            match timeout(write_timeout, write_half.write_all(frame.as_bytes())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "Stream write failed, closing writer");
                    break;
                }
                Err(_) => {
                    tracing::warn!(peer = %peer, "Stream write timed out, closing writer");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_update_becomes_chapter_progress_event() {
        let update: ProgressUpdate = serde_json::from_str(
            r#"{"user_id":"alice","manga_id":"Example Manga","chapter":5,"timestamp":"2026-08-01T12:00:00Z"}"#,
        )
        .unwrap();
        let event = update.into_event();

        assert_eq!(event.event_type, crate::event::EventType::ChapterProgress);
        assert_eq!(event.message, "alice read Chapter 5 of Example Manga");
        assert_eq!(event.chapter_number, Some(5));
        assert_eq!(event.occurred_at.to_rfc3339(), "2026-08-01T12:00:00+00:00");
    }

    #[test]
    fn timestamp_is_optional() {
        let update: ProgressUpdate =
            serde_json::from_str(r#"{"user_id":"bob","manga_id":"m1","chapter":1}"#).unwrap();
        assert!(update.timestamp.is_none());
    }
}
