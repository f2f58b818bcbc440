pub mod engine;
pub mod events;
pub mod models;
pub mod notifier;

pub use engine::{MatchEngine, MatchOutcome, MatchStatus, MatchStep, StepFailure};
pub use models::{pair_key, Chat, Like, Match, Notification, NotificationKind, PushToken};
pub use notifier::Notifier;
