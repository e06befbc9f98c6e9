use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::chat::ChatMessage;
use crate::error::{BridgeError, Result};
use crate::event::Identity;
use crate::hub::BroadcastRequest;
use crate::registry::{HandleKey, RoomSubscriber, SubscriberHandle};
use crate::server::AppState;

use super::message::{ClientFrame, PresenceAction, RoomFrame};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room to join; created lazily if it does not exist yet
    pub room: Option<String>,
    /// Authenticated user id, if the caller has one
    pub user: Option<String>,
    /// Optional series binding recorded when the room is created
    pub manga_id: Option<String>,
}

/// WebSocket upgrade handler for the duplex transport.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query),
    fields(room = query.room.as_deref().unwrap_or(""))
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Result<Response> {
    let room_id = match query.room {
        Some(room) if !room.is_empty() => room,
        _ => return Err(BridgeError::Validation("missing room identifier".into())),
    };

    let identity = match query.user {
        Some(user_id) if !user_id.is_empty() => Identity::Authenticated { user_id },
        _ => Identity::anonymous(),
    };

    let manga_id = query.manga_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, manga_id, identity)))
}

/// Handle an established duplex connection: join the room, replay history,
/// then shuttle frames until the peer goes away.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, manga_id, identity),
    fields(room_id = %room_id, member = %identity.display_name())
)]
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    room_id: String,
    manga_id: Option<String>,
    identity: Identity,
) {
    let display_name = identity.display_name();
    let (tx, mut rx) = mpsc::channel::<String>(state.settings.chat.send_buffer);

    let subscriber = RoomSubscriber::new(identity, tx.clone());
    let member_key = subscriber.key();

    state
        .hub
        .register(SubscriberHandle::Room {
            room_id: room_id.clone(),
            manga_id: manga_id.clone(),
            subscriber,
        })
        .await;

    tracing::info!(room_id = %room_id, member = %display_name, "Duplex member joined");

    // Replay recent history to the joining client only. Read-only use of the
    // persistence collaborator; the hub never writes history.
    send_room_update(&state, &room_id, manga_id, &tx).await;

    // Announce the join to the room's live set
    let members = state.hub.registry().room_member_count(&room_id).await;
    state.hub.broadcast(BroadcastRequest::Room {
        room_id: room_id.clone(),
        frame: RoomFrame::Presence {
            room_id: room_id.clone(),
            member: display_name.clone(),
            action: PresenceAction::Joined,
            members,
        },
    });

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound: drain the connection channel onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound: client frames
    let recv_state = state.clone();
    let recv_room = room_id.clone();
    let recv_name = display_name.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_frame(msg, &recv_state, &recv_room, &recv_name).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Duplex receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    state
        .hub
        .unregister(HandleKey::Room {
            room_id: room_id.clone(),
            key: member_key,
        })
        .await;

    let members = state.hub.registry().room_member_count(&room_id).await;
    state.hub.broadcast(BroadcastRequest::Room {
        room_id: room_id.clone(),
        frame: RoomFrame::Presence {
            room_id: room_id.clone(),
            member: display_name.clone(),
            action: PresenceAction::Left,
            members,
        },
    });

    tracing::info!(room_id = %room_id, member = %display_name, "Duplex member left");
}

async fn send_room_update(
    state: &AppState,
    room_id: &str,
    manga_id: Option<String>,
    tx: &mpsc::Sender<String>,
) {
    let limit = state.settings.chat.history_limit;
    let (recent_messages, total_messages) =
        match state.message_store.get_recent(room_id, limit, 0).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "History fetch failed, joining without replay");
                (Vec::new(), 0)
            }
        };

    let frame = RoomFrame::RoomUpdate {
        room_id: room_id.to_string(),
        members: state.hub.registry().room_member_count(room_id).await,
        manga_id,
        recent_messages,
        total_messages,
    };

    match serde_json::to_string(&frame) {
        Ok(text) => {
            let _ = tx.send(text).await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize room update");
        }
    }
}

/// Returns false when the connection should be closed.
async fn process_frame(msg: Message, state: &AppState, room_id: &str, author: &str) -> bool {
    match msg {
        Message::Text(text) => {
            let frame: ClientFrame = match serde_json::from_str(&text) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(room_id = %room_id, error = %e, "Malformed duplex frame discarded");
                    return true;
                }
            };
            handle_client_frame(frame, state, room_id, author).await;
            true
        }
        Message::Binary(_) => {
            tracing::warn!(room_id = %room_id, "Binary duplex frame discarded");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => false,
    }
}

async fn handle_client_frame(frame: ClientFrame, state: &AppState, room_id: &str, author: &str) {
    match frame {
        ClientFrame::Message { content } => {
            let chat = ChatMessage::new(room_id, author, content);

            // Persist first, then broadcast to the room's live set only
            if let Err(e) = state.message_store.save(&chat).await {
                tracing::warn!(room_id = %room_id, error = %e, "Failed to persist chat message");
            }

            state.hub.broadcast(BroadcastRequest::Room {
                room_id: room_id.to_string(),
                frame: RoomFrame::Message { message: chat },
            });
        }
        ClientFrame::Typing => {
            state.hub.broadcast(BroadcastRequest::Room {
                room_id: room_id.to_string(),
                frame: RoomFrame::Typing {
                    room_id: room_id.to_string(),
                    author: author.to_string(),
                },
            });
        }
    }
}
