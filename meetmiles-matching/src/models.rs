use serde::{de::DeserializeOwned, Deserialize, Serialize};

use meetmiles_shared::clients::backend::{BackendError, BackendResult};
use meetmiles_shared::types::query::Row;

/// Order-independent key for an unordered user pair.
pub fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Parse a backend row into a model.
pub fn from_row<T: DeserializeOwned>(row: Row) -> BackendResult<T> {
    serde_json::from_value(row).map_err(BackendError::from)
}

pub fn to_row<T: Serialize>(model: &T) -> BackendResult<Row> {
    serde_json::to_value(model).map_err(BackendError::from)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Like {
    pub fn new(sender_id: &str, receiver_id: &str) -> Self {
        Self {
            id: None,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            kind: "like".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user1: String,
    pub user2: String,
    /// Absent on rows written before pair keys existed.
    #[serde(default)]
    pub pair_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Match {
    pub fn new(user1: &str, user2: &str) -> Self {
        Self {
            id: None,
            user1: user1.to_string(),
            user2: user2.to_string(),
            pair_key: Some(pair_key(user1, user2)),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub match_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Match,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Match => "match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushToken {
    pub user_id: String,
    pub token: String,
}
