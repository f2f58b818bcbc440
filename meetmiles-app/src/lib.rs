pub mod app;
pub mod config;
pub mod store;

pub use app::App;
pub use config::{AppConfig, PushSettings};
pub use store::{Session, SessionStore};
