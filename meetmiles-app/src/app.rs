use std::sync::Arc;

use meetmiles_discovery::{DiscoveryService, SwipeController, SwipeDeck};
use meetmiles_matching::MatchEngine;
use meetmiles_messaging::{ChatContext, ChatSession};
use meetmiles_shared::clients::backend::Backend;
use meetmiles_shared::clients::memory::MemoryBackend;
use meetmiles_shared::clients::push::{PushClient, PushDispatcher};
use meetmiles_shared::errors::{AppError, AppResult};
use meetmiles_shared::types::event::EventBus;

use crate::config::AppConfig;
use crate::store::SessionStore;

/// Everything one signed-in client needs, wired once.
pub struct App<B: Backend, P: PushDispatcher> {
    config: AppConfig,
    backend: Arc<B>,
    bus: EventBus,
    session: SessionStore,
    discovery: DiscoveryService<B>,
    engine: Arc<MatchEngine<B, P>>,
}

impl<B: Backend, P: PushDispatcher> App<B, P> {
    pub fn new(config: AppConfig, backend: Arc<B>, push: Arc<P>, session: SessionStore) -> Self {
        let bus = EventBus::with_capacity(config.event_bus_capacity);
        let discovery = DiscoveryService::with_placeholder(backend.clone(), &config.placeholder_photo_url);
        let engine = Arc::new(MatchEngine::new(backend.clone(), push, bus.clone()));
        Self {
            config,
            backend,
            bus,
            session,
            discovery,
            engine,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn engine(&self) -> &Arc<MatchEngine<B, P>> {
        &self.engine
    }

    fn signed_in_user(&self) -> AppResult<String> {
        self.session
            .user_id()
            .ok_or_else(|| AppError::Validation("no signed-in user".into()))
    }

    /// Fetch the candidate pool and put a fresh deck in front of it.
    pub async fn swipe_controller(&self) -> AppResult<SwipeController<MatchEngine<B, P>>> {
        let user_id = self.signed_in_user()?;
        let pool = self.discovery.fetch_candidates(&user_id).await;
        tracing::info!(user_id = %user_id, candidates = pool.len(), "deck ready");

        let deck = SwipeDeck::new(pool, self.config.deck_settings());
        Ok(SwipeController::new(deck, user_id, self.engine.clone(), self.bus.clone()))
    }

    pub async fn open_chat(&self, chat_id: &str, peer_id: &str) -> AppResult<ChatSession<B>> {
        let user_id = self.signed_in_user()?;
        ChatSession::attach(
            self.backend.clone(),
            ChatContext::new(chat_id, &user_id, peer_id),
            self.config.chat_settings(),
            self.bus.clone(),
        )
        .await
    }
}

impl App<MemoryBackend, PushClient> {
    /// In-process backend with push chosen from configuration.
    pub fn in_memory(config: AppConfig, backend: Arc<MemoryBackend>, session: SessionStore) -> Self {
        let push = config.push_settings();
        let client = PushClient::from_settings(push.enabled, &push.endpoint, push.access_token.as_deref());
        Self::new(config, backend, Arc::new(client), session)
    }
}
