use std::sync::Arc;

use serde_json::json;

use meetmiles_discovery::{DeckPhase, DeckSettings, DiscoveryService, SwipeController, SwipeDeck, SwipeDirection};
use meetmiles_matching::{MatchEngine, MatchStatus};
use meetmiles_shared::clients::backend::Backend;
use meetmiles_shared::clients::memory::MemoryBackend;
use meetmiles_shared::clients::push::DisabledPush;
use meetmiles_shared::types::event::EventBus;
use meetmiles_shared::types::query::Table;

async fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .insert(
            Table::Profiles,
            vec![
                json!({ "id": "u1", "name": "Avery", "gender": "female" }),
                json!({ "id": "u2", "name": "Blake", "gender": "male", "photos": ["https://img/u2.jpg"] }),
                json!({ "id": "u3", "name": "Casey", "photos": "{https://img/u3a.jpg,https://img/u3b.jpg}" }),
            ],
        )
        .await
        .unwrap();
    backend
}

async fn controller(
    backend: Arc<MemoryBackend>,
) -> SwipeController<MatchEngine<MemoryBackend, DisabledPush>> {
    let bus = EventBus::new();
    let pool = DiscoveryService::new(backend.clone()).fetch_candidates("u1").await;
    let deck = SwipeDeck::new(pool, DeckSettings::default());
    let engine = Arc::new(MatchEngine::new(backend, Arc::new(DisabledPush), bus.clone()));
    SwipeController::new(deck, "u1", engine, bus)
}

#[tokio::test(start_paused = true)]
async fn swipe_left_writes_nothing_and_advances() {
    let backend = seeded_backend().await;
    let mut ctl = controller(backend.clone()).await;
    assert_eq!(ctl.deck().current().unwrap().id, "u2");

    ctl.drag(-150.0, 4.0);
    let decision = ctl.release().await.unwrap();
    assert_eq!(decision.direction, SwipeDirection::Left);
    assert!(ctl.settle().await.is_empty());

    assert_eq!(ctl.deck().current().unwrap().id, "u3");
    assert_eq!(backend.count(Table::Likes), 0);
    assert_eq!(backend.count(Table::Notifications), 0);
}

#[tokio::test(start_paused = true)]
async fn swipe_right_on_someone_who_liked_back_matches() {
    let backend = seeded_backend().await;
    backend
        .insert(Table::Likes, vec![json!({ "sender_id": "u2", "receiver_id": "u1", "type": "like" })])
        .await
        .unwrap();
    let mut ctl = controller(backend.clone()).await;

    ctl.drag(180.0, 0.0);
    ctl.release().await.unwrap();
    ctl.press(SwipeDirection::Left).await.unwrap();
    assert_eq!(ctl.deck().phase(), DeckPhase::Exhausted);

    let outcomes = ctl.settle().await;
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].status, MatchStatus::Matched { .. }));
    assert_eq!(backend.count(Table::Matches), 1);
    assert_eq!(backend.count(Table::Chats), 1);
    assert_eq!(backend.count(Table::Likes), 2);
}
