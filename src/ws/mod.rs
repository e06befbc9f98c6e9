//! Duplex transport: room-scoped chat over WebSocket.

mod handler;
mod message;

pub use handler::ws_handler;
pub use message::{ClientFrame, PresenceAction, RoomFrame};
