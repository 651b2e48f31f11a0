use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MemberSnapshot;

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the connection with a signed token. Must be the first
    /// command on a fresh socket.
    Identify { token: String },

    /// Bind this session into a chat room's fan-out set.
    Join { room_id: Uuid },

    /// Unbind this session from a room. Idempotent.
    Leave { room_id: Uuid },

    /// Send a message into a room the session is bound to.
    Message {
        room_id: Uuid,
        body: String,
        sender: MemberSnapshot,
    },
}

/// Events sent FROM server TO client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Identify succeeded; the session is live.
    Ready { user_id: Uuid, name: String },

    /// A message was accepted into a room this session is bound to.
    /// Broadcast to every bound session, the sender included.
    Reply {
        room_id: Uuid,
        body: String,
        sender: MemberSnapshot,
        sent_on: DateTime<Utc>,
    },

    /// A command failed. Sent only to the session that issued it.
    Error { message: String },
}
