//! Local message list: confirmed rows plus optimistic placeholders.
//!
//! Identity is always the message id, never the position. Placeholders carry
//! a client-generated `local-` id until the insert response replaces them;
//! realtime echoes are deduplicated against confirmed ids, so the list never
//! holds two entries with the same server id whichever arrives first.

use chrono::Utc;

use crate::models::Message;

const PLACEHOLDER_PREFIX: &str = "local-";

/// Collision-resistant client id: millisecond timestamp plus 64 random bits.
pub fn placeholder_id() -> String {
    format!(
        "{PLACEHOLDER_PREFIX}{}-{:016x}",
        Utc::now().timestamp_millis(),
        rand::random::<u64>()
    )
}

pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub message: Message,
    /// Placeholder id this entry was sent under, if it originated locally.
    pub local_id: Option<String>,
    pub state: DeliveryState,
}

/// How a send confirmation was folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The placeholder became the confirmed row, in place.
    Replaced,
    /// The realtime echo was already listed; the placeholder was dropped.
    EchoFirst,
    /// Neither placeholder nor echo was listed; the row was appended.
    Appended,
}

#[derive(Debug, Default, Clone)]
pub struct ChatTimeline {
    entries: Vec<TimelineEntry>,
}

impl ChatTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with loaded history, keeping the first copy of any repeated id.
    pub fn load(&mut self, history: Vec<Message>) {
        self.entries.clear();
        for message in history {
            if self.position(&message.id).is_none() {
                self.entries.push(TimelineEntry {
                    message,
                    local_id: None,
                    state: DeliveryState::Sent,
                });
            }
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TimelineEntry> {
        self.position(id).map(|i| &self.entries[i])
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == id)
    }

    pub fn push_optimistic(&mut self, message: Message) {
        self.entries.push(TimelineEntry {
            local_id: Some(message.id.clone()),
            message,
            state: DeliveryState::Pending,
        });
    }

    pub fn confirm(&mut self, placeholder_id: &str, confirmed: Message) -> Confirmation {
        let placeholder = self.position(placeholder_id);

        if let Some(existing) = self.position(&confirmed.id) {
            self.entries[existing].message.merge(confirmed);
            self.entries[existing].local_id = Some(placeholder_id.to_string());
            self.entries[existing].state = DeliveryState::Sent;
            if let Some(index) = placeholder {
                self.entries.remove(index);
            }
            return Confirmation::EchoFirst;
        }

        match placeholder {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.message = confirmed;
                entry.state = DeliveryState::Sent;
                Confirmation::Replaced
            }
            None => {
                self.entries.push(TimelineEntry {
                    message: confirmed,
                    local_id: Some(placeholder_id.to_string()),
                    state: DeliveryState::Sent,
                });
                Confirmation::Appended
            }
        }
    }

    /// Mark a pending placeholder as failed. It stays in the list.
    pub fn fail(&mut self, placeholder_id: &str) -> bool {
        match self.position(placeholder_id) {
            Some(index) if self.entries[index].state == DeliveryState::Pending => {
                self.entries[index].state = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Move a failed placeholder back to pending and hand back its message for re-sending.
    pub fn retry(&mut self, placeholder_id: &str) -> Option<Message> {
        let index = self.position(placeholder_id)?;
        let entry = &mut self.entries[index];
        if entry.state != DeliveryState::Failed {
            return None;
        }
        entry.state = DeliveryState::Pending;
        Some(entry.message.clone())
    }

    /// Realtime insert. Returns false for a duplicate, which is merged instead.
    pub fn apply_insert(&mut self, message: Message) -> bool {
        match self.position(&message.id) {
            Some(index) => {
                self.entries[index].message.merge(message);
                false
            }
            None => {
                self.entries.push(TimelineEntry {
                    message,
                    local_id: None,
                    state: DeliveryState::Sent,
                });
                true
            }
        }
    }

    /// Realtime update or receipt. Unknown ids are ignored.
    pub fn apply_update(&mut self, message: Message) -> bool {
        match self.position(&message.id) {
            Some(index) => {
                self.entries[index].message.merge(message);
                true
            }
            None => false,
        }
    }
}
