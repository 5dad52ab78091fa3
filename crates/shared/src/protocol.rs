//! WebSocket protocol definitions.
//!
//! Every frame on the live connection is a [`WsEnvelope`] wrapping either a
//! [`ClientCommand`] (client → server) or a [`ServerEvent`] (server → client).
//! The payload enum is flattened into the envelope, so the wire shape is
//! `{ "id": …, "type": …, "data": …, "ts": … }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, Notification};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
        }
    }
}

/// Commands the client may send over the live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename = "chat.send", rename_all = "camelCase")]
    ChatSend {
        recipient_id: String,
        content: String,
    },
}

/// Events the server pushes over the live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "chat.message")]
    ChatMessage { message: ChatMessage },
    #[serde(rename = "notification.new")]
    NotificationNew { notification: Notification },
}
