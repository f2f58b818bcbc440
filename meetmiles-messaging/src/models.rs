use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use meetmiles_shared::clients::backend::{BackendError, BackendResult};
use meetmiles_shared::types::query::{timestamp, Row, Table};

fn default_content_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn from_row(row: Row) -> BackendResult<Self> {
        serde_json::from_value(row).map_err(|e| BackendError::Row {
            table: Table::Messages,
            message: e.to_string(),
        })
    }

    pub fn is_for(&self, user_id: &str) -> bool {
        self.receiver_id == user_id
    }

    /// Fold a newer copy of this row in, never clearing a receipt already held.
    pub fn merge(&mut self, incoming: Message) {
        let delivered_at = incoming.delivered_at.or(self.delivered_at);
        let seen_at = incoming.seen_at.or(self.seen_at);
        *self = incoming;
        self.seen_at = seen_at;
        self.delivered_at = delivered_at.or(seen_at);
    }

    pub fn to_new(&self) -> NewMessage {
        NewMessage {
            chat_id: self.chat_id.clone(),
            sender_id: self.sender_id.clone(),
            receiver_id: self.receiver_id.clone(),
            content: self.content.clone(),
            content_type: self.content_type.clone(),
        }
    }
}

/// Insert payload; the backend assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub content_type: String,
}

impl NewMessage {
    pub fn to_row(&self) -> BackendResult<Row> {
        serde_json::to_value(self).map_err(BackendError::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub chat_id: String,
    pub user_id: String,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TypingIndicator {
    pub fn row(chat_id: &str, user_id: &str, is_typing: bool) -> Row {
        serde_json::json!({
            "chat_id": chat_id,
            "user_id": user_id,
            "is_typing": is_typing,
            "updated_at": timestamp(Utc::now()),
        })
    }
}
