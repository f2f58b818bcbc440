use meetmiles_shared::types::event::{payloads, DomainEvent, EventBus};

const SOURCE: &str = "meetmiles-matching";

pub fn publish_like_sent(bus: &EventBus, sender_id: &str, receiver_id: &str) {
    let receivers = bus.publish(
        SOURCE,
        sender_id,
        DomainEvent::LikeSent(payloads::LikeSent {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
        }),
    );
    tracing::trace!(receivers, "like.sent published");
}

pub fn publish_match_created(
    bus: &EventBus,
    match_id: &str,
    chat_id: Option<&str>,
    user_a_id: &str,
    user_b_id: &str,
) {
    let receivers = bus.publish(
        SOURCE,
        user_a_id,
        DomainEvent::MatchCreated(payloads::MatchCreated {
            match_id: match_id.to_string(),
            chat_id: chat_id.map(str::to_string),
            user_a_id: user_a_id.to_string(),
            user_b_id: user_b_id.to_string(),
        }),
    );
    tracing::trace!(receivers, "match.created published");
}
