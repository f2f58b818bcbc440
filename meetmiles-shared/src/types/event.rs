use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Domain event envelope published on the in-process [`EventBus`].
///
/// Event type format: `meetmiles.{domain}.{entity}.{action}`
/// Example: `meetmiles.matching.match.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Event type strings
pub mod event_types {
    // Discovery events
    pub const DISCOVERY_SWIPE_COMMITTED: &str = "meetmiles.discovery.swipe.committed";

    // Matching events
    pub const MATCHING_LIKE_SENT: &str = "meetmiles.matching.like.sent";
    pub const MATCHING_MATCH_CREATED: &str = "meetmiles.matching.match.created";

    // Messaging events
    pub const MESSAGING_MESSAGE_SENT: &str = "meetmiles.messaging.message.sent";
    pub const MESSAGING_MESSAGE_FAILED: &str = "meetmiles.messaging.message.failed";
}

/// Event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SwipeCommitted {
        pub user_id: String,
        pub profile_id: String,
        pub direction: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct LikeSent {
        pub sender_id: String,
        pub receiver_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub match_id: String,
        pub chat_id: Option<String>,
        pub user_a_id: String,
        pub user_b_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MessageSent {
        pub message_id: String,
        pub chat_id: String,
        pub sender_id: String,
        pub receiver_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MessageFailed {
        pub placeholder_id: String,
        pub chat_id: String,
        pub sender_id: String,
        pub reason: String,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    SwipeCommitted(payloads::SwipeCommitted),
    LikeSent(payloads::LikeSent),
    MatchCreated(payloads::MatchCreated),
    MessageSent(payloads::MessageSent),
    MessageFailed(payloads::MessageFailed),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SwipeCommitted(_) => event_types::DISCOVERY_SWIPE_COMMITTED,
            Self::LikeSent(_) => event_types::MATCHING_LIKE_SENT,
            Self::MatchCreated(_) => event_types::MATCHING_MATCH_CREATED,
            Self::MessageSent(_) => event_types::MESSAGING_MESSAGE_SENT,
            Self::MessageFailed(_) => event_types::MESSAGING_MESSAGE_FAILED,
        }
    }
}

// --- EventBus ---

const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Broadcast fan-out for [`DomainEvent`]s. Cheap to clone.
///
/// Subscribers lagging more than the capacity skip events
/// (`broadcast::error::RecvError::Lagged`).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event<DomainEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of receivers; zero is not an error.
    pub fn publish(&self, source: &str, user_id: &str, data: DomainEvent) -> usize {
        let event = Event::new(source, data.event_type(), data).with_user(user_id);
        tracing::debug!(
            event_type = %event.event_type,
            event_id = %event.id,
            "domain event published"
        );
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event<DomainEvent>> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_type_and_user() {
        let data = DomainEvent::LikeSent(payloads::LikeSent {
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
        });
        let event = Event::new("meetmiles-matching", data.event_type(), data).with_user("u1");
        assert_eq!(event.event_type, "meetmiles.matching.like.sent");
        assert_eq!(event.user_id.as_deref(), Some("u1"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["kind"], "like_sent");
        assert_eq!(json["data"]["receiver_id"], "u2");
    }

    #[tokio::test]
    async fn bus_fanout() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let n = bus.publish(
            "meetmiles-matching",
            "u1",
            DomainEvent::MatchCreated(payloads::MatchCreated {
                match_id: "m1".into(),
                chat_id: Some("c1".into()),
                user_a_id: "u1".into(),
                user_b_id: "u2".into(),
            }),
        );
        assert_eq!(n, 2);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.id, e2.id);
        assert_eq!(e1.event_type, event_types::MATCHING_MATCH_CREATED);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::with_capacity(4);
        let n = bus.publish(
            "meetmiles-discovery",
            "u1",
            DomainEvent::SwipeCommitted(payloads::SwipeCommitted {
                user_id: "u1".into(),
                profile_id: "u9".into(),
                direction: "left".into(),
            }),
        );
        assert_eq!(n, 0);
    }
}
