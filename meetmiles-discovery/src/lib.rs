pub mod controller;
pub mod deck;
pub mod profile;
pub mod service;

pub use controller::{LikeHandler, SwipeController};
pub use deck::{DeckPhase, DeckSettings, Release, SwipeDeck, SwipeDecision, SwipeDirection};
pub use profile::{normalize_photos, normalize_photos_with, CandidateProfile, PLACEHOLDER_PHOTO_URL};
pub use service::DiscoveryService;
