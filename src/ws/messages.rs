//! WebSocket wire messages: inbound client frames and outbound chat
//! broadcasts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Principal, UserId};

/// Discriminator value of chat frames.
pub const CHAT_KIND: &str = "chat";

/// An inbound client frame.
///
/// Only `type` is required; any other field is read by the handler for
/// that kind. Unknown kinds are ignored, so clients may send frames newer
/// servers understand.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    /// Frame kind (e.g. `"chat"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Chat text. Kept untyped so a non-string value is a shape error, not
    /// a parse error.
    #[serde(default)]
    pub message: Option<serde_json::Value>,
    /// Client-asserted sender name. Never trusted.
    #[serde(default)]
    pub username: Option<String>,
}

/// A chat message as broadcast to every participant.
///
/// ```json
/// {
///   "type": "chat",
///   "sender_id": "7d0c…",
///   "username": "alice@example.com",
///   "message": "hello",
///   "timestamp": "2026-10-19T12:00:00.123456Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Always `"chat"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Account id of the sender, taken from the admitted session.
    pub sender_id: UserId,
    /// Display label of the sender, taken from the admitted session.
    pub username: String,
    /// Message text.
    pub message: String,
    /// Server-assigned RFC 3339 timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Builds a message from `sender`, stamped with the current time.
    #[must_use]
    pub fn new(sender: &Principal, message: String) -> Self {
        Self {
            kind: CHAT_KIND.to_string(),
            sender_id: sender.user_id,
            username: sender.label.clone(),
            message,
            timestamp: Utc::now(),
        }
    }
}
