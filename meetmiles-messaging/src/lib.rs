pub mod events;
pub mod models;
pub mod receipts;
pub mod session;
pub mod timeline;
pub mod typing;

pub use models::{Message, NewMessage, TypingIndicator};
pub use session::{ChatContext, ChatSession, ChatSettings, SendOutcome, SessionUpdate};
pub use timeline::{ChatTimeline, DeliveryState, TimelineEntry};
pub use typing::TypingDebouncer;
