use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const EXPO_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    #[serde(rename = "to")]
    pub token: String,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl PushMessage {
    pub fn new(token: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            title: title.into(),
            body: body.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid push token: {0}")]
    InvalidToken(String),
}

/// Best-effort delivery of a push notification to one device token.
pub trait PushDispatcher: Send + Sync + 'static {
    fn send(&self, message: PushMessage) -> impl Future<Output = Result<(), PushError>> + Send + '_;
}

/// `ExponentPushToken[...]` or `ExpoPushToken[...]`.
pub fn is_expo_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .any(|prefix| token.starts_with(prefix) && token.len() > prefix.len() + 1)
        && token.ends_with(']')
}

// --- Expo ---

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Option<ExpoTickets>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpoTickets {
    One(ExpoTicket),
    Many(Vec<ExpoTicket>),
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct ExpoPushClient {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
}

impl ExpoPushClient {
    pub fn new(endpoint: &str, access_token: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            access_token: access_token.map(str::to_string),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PushDispatcher for ExpoPushClient {
    async fn send(&self, message: PushMessage) -> Result<(), PushError> {
        if !is_expo_token(&message.token) {
            return Err(PushError::InvalidToken(message.token));
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&message);
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(PushError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // 200 with a per-ticket error is still a rejection
        if let Ok(ExpoResponse { data: Some(tickets) }) = serde_json::from_str::<ExpoResponse>(&body) {
            let tickets = match tickets {
                ExpoTickets::One(ticket) => vec![ticket],
                ExpoTickets::Many(tickets) => tickets,
            };
            if let Some(failed) = tickets.into_iter().find(|t| t.status == "error") {
                return Err(PushError::Rejected {
                    status: status.as_u16(),
                    body: failed.message.unwrap_or(body),
                });
            }
        }

        tracing::debug!(title = %message.title, "push sent");
        Ok(())
    }
}

/// Drops every message. Used when push is turned off in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPush;

impl PushDispatcher for DisabledPush {
    async fn send(&self, message: PushMessage) -> Result<(), PushError> {
        tracing::debug!(title = %message.title, "push disabled, message dropped");
        Ok(())
    }
}

/// The dispatcher chosen at startup.
#[derive(Clone)]
pub enum PushClient {
    Expo(ExpoPushClient),
    Disabled(DisabledPush),
}

impl PushClient {
    pub fn from_settings(enabled: bool, endpoint: &str, access_token: Option<&str>) -> Self {
        if enabled {
            Self::Expo(ExpoPushClient::new(endpoint, access_token))
        } else {
            Self::Disabled(DisabledPush)
        }
    }
}

impl PushDispatcher for PushClient {
    async fn send(&self, message: PushMessage) -> Result<(), PushError> {
        match self {
            Self::Expo(client) => client.send(message).await,
            Self::Disabled(client) => client.send(message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_expo_tokens() {
        assert!(is_expo_token("ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]"));
        assert!(is_expo_token("ExpoPushToken[abc]"));
        assert!(!is_expo_token("ExponentPushToken[]"));
        assert!(!is_expo_token("fcm:abc"));
        assert!(!is_expo_token(""));
    }

    #[test]
    fn message_serializes_expo_shape() {
        let msg = PushMessage::new("ExpoPushToken[abc]", "It's a match!", "You and Sam liked each other")
            .with_data(serde_json::json!({ "type": "match", "match_id": "m1" }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["to"], "ExpoPushToken[abc]");
        assert_eq!(json["title"], "It's a match!");
        assert_eq!(json["data"]["type"], "match");

        let bare = serde_json::to_value(PushMessage::new("t", "a", "b")).unwrap();
        assert!(bare.get("data").is_none());
    }

    #[tokio::test]
    async fn expo_client_rejects_malformed_token_locally() {
        let client = ExpoPushClient::new("http://127.0.0.1:9/never-called", None);
        let err = client
            .send(PushMessage::new("not-a-token", "t", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::InvalidToken(t) if t == "not-a-token"));
    }

    #[tokio::test]
    async fn disabled_client_accepts_everything() {
        let client = PushClient::from_settings(false, EXPO_PUSH_ENDPOINT, None);
        assert!(matches!(client, PushClient::Disabled(_)));
        client.send(PushMessage::new("anything", "t", "b")).await.unwrap();
    }

    #[test]
    fn ticket_errors_parse_in_both_shapes() {
        let one: ExpoResponse =
            serde_json::from_str(r#"{"data":{"status":"error","message":"DeviceNotRegistered"}}"#).unwrap();
        assert!(matches!(one.data, Some(ExpoTickets::One(ref t)) if t.status == "error"));

        let many: ExpoResponse = serde_json::from_str(r#"{"data":[{"status":"ok","id":"x"}]}"#).unwrap();
        assert!(matches!(many.data, Some(ExpoTickets::Many(ref v)) if v.len() == 1));
    }
}
