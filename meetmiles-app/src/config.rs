use std::time::Duration;

use serde::Deserialize;

use meetmiles_discovery::{DeckSettings, PLACEHOLDER_PHOTO_URL};
use meetmiles_messaging::ChatSettings;
use meetmiles_shared::clients::push::EXPO_PUSH_ENDPOINT;
use meetmiles_shared::errors::{AppError, AppResult, ErrorCode};

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_push_endpoint")]
    pub push_endpoint: String,
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,
    #[serde(default)]
    pub push_access_token: Option<String>,
    #[serde(default = "default_placeholder_photo_url")]
    pub placeholder_photo_url: String,
    #[serde(default = "default_screen_width")]
    pub screen_width: f64,
    #[serde(default = "default_fly_off_ms")]
    pub fly_off_ms: u64,
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: u64,
    #[serde(default = "default_typing_idle_ms")]
    pub typing_idle_ms: u64,
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

fn default_env() -> String { "development".into() }
fn default_push_endpoint() -> String { EXPO_PUSH_ENDPOINT.into() }
fn default_push_enabled() -> bool { true }
fn default_placeholder_photo_url() -> String { PLACEHOLDER_PHOTO_URL.into() }
fn default_screen_width() -> f64 { 390.0 }
fn default_fly_off_ms() -> u64 { 250 }
fn default_advance_delay_ms() -> u64 { 120 }
fn default_typing_idle_ms() -> u64 { 1800 }
fn default_event_bus_capacity() -> usize { 1024 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: default_env(),
            push_endpoint: default_push_endpoint(),
            push_enabled: default_push_enabled(),
            push_access_token: None,
            placeholder_photo_url: default_placeholder_photo_url(),
            screen_width: default_screen_width(),
            fly_off_ms: default_fly_off_ms(),
            advance_delay_ms: default_advance_delay_ms(),
            typing_idle_ms: default_typing_idle_ms(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

/// Push delivery settings derived from [`AppConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PushSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub access_token: Option<String>,
}

impl AppConfig {
    /// Read `MEETMILES_*` environment variables over the defaults.
    pub fn load() -> AppResult<Self> {
        Self::load_from(Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("MEETMILES")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn load_from(source: config::Environment) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .map_err(|e| AppError::new(ErrorCode::ConfigInvalid, e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::new(ErrorCode::ConfigInvalid, e.to_string()))?;
        loaded.validate()?;

        tracing::debug!(env = %loaded.env, push_enabled = loaded.push_enabled, "configuration loaded");
        Ok(loaded)
    }

    fn validate(&self) -> AppResult<()> {
        if !(self.screen_width.is_finite() && self.screen_width > 0.0) {
            return Err(AppError::new(
                ErrorCode::ConfigInvalid,
                format!("screen_width must be positive, got {}", self.screen_width),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(AppError::new(ErrorCode::ConfigInvalid, "event_bus_capacity must be at least 1"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn deck_settings(&self) -> DeckSettings {
        DeckSettings {
            screen_width: self.screen_width,
            fly_off: Duration::from_millis(self.fly_off_ms),
            advance_delay: Duration::from_millis(self.advance_delay_ms),
            ..DeckSettings::default()
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            typing_idle: Duration::from_millis(self.typing_idle_ms),
        }
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            enabled: self.push_enabled,
            endpoint: self.push_endpoint.clone(),
            access_token: self.push_access_token.clone().filter(|t| !t.is_empty()),
        }
    }
}
