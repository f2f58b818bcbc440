use meetmiles_shared::types::event::{payloads, DomainEvent, EventBus};

use crate::models::Message;

const SOURCE: &str = "meetmiles-messaging";

pub fn publish_message_sent(bus: &EventBus, message: &Message) {
    bus.publish(
        SOURCE,
        &message.sender_id,
        DomainEvent::MessageSent(payloads::MessageSent {
            message_id: message.id.clone(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
        }),
    );
}

pub fn publish_message_failed(bus: &EventBus, placeholder: &Message, reason: &str) {
    bus.publish(
        SOURCE,
        &placeholder.sender_id,
        DomainEvent::MessageFailed(payloads::MessageFailed {
            placeholder_id: placeholder.id.clone(),
            chat_id: placeholder.chat_id.clone(),
            sender_id: placeholder.sender_id.clone(),
            reason: reason.to_string(),
        }),
    );
}
