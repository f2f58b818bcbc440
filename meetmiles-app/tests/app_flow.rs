use std::sync::Arc;

use serde_json::json;

use meetmiles_app::{App, AppConfig, SessionStore};
use meetmiles_discovery::SwipeDirection;
use meetmiles_matching::MatchStatus;
use meetmiles_messaging::SendOutcome;
use meetmiles_shared::clients::backend::Backend;
use meetmiles_shared::clients::memory::MemoryBackend;
use meetmiles_shared::clients::push::DisabledPush;
use meetmiles_shared::errors::{AppError, ErrorCode};
use meetmiles_shared::types::event::DomainEvent;
use meetmiles_shared::types::query::Table;

async fn backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .insert(
            Table::Profiles,
            vec![
                json!({ "id": "u1", "name": "Avery" }),
                json!({ "id": "u2", "name": "Blake" }),
            ],
        )
        .await
        .unwrap();
    backend
}

fn app(backend: &Arc<MemoryBackend>, user_id: &str, name: &str) -> App<MemoryBackend, DisabledPush> {
    App::new(
        AppConfig::default(),
        backend.clone(),
        Arc::new(DisabledPush),
        SessionStore::sign_in(user_id, name),
    )
}

#[tokio::test(start_paused = true)]
async fn mutual_like_then_first_message() {
    let backend = backend().await;
    let avery = app(&backend, "u1", "Avery");
    let blake = app(&backend, "u2", "Blake");
    let mut events = avery.bus().subscribe();

    let first = blake.engine().process_like("u2", "u1").await;
    assert_eq!(first.status, MatchStatus::LikeRecorded);

    let mut deck = avery.swipe_controller().await.unwrap();
    assert_eq!(deck.deck().current().unwrap().id, "u2");
    deck.press(SwipeDirection::Right).await.unwrap();
    let outcomes = deck.settle().await;
    let chat_id = outcomes[0].chat_id().unwrap().to_string();
    assert!(deck.deck().is_exhausted());

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.event_type);
    }
    assert!(kinds.contains(&"meetmiles.matching.match.created".to_string()));

    let mut avery_chat = avery.open_chat(&chat_id, "u2").await.unwrap();
    let mut blake_chat = blake.open_chat(&chat_id, "u1").await.unwrap();

    avery_chat.set_input("hello").await;
    assert!(matches!(avery_chat.send_message().await, SendOutcome::Sent { .. }));
    blake_chat.pump().await;

    let received: Vec<_> = blake_chat.messages().map(|m| m.content.as_str()).collect();
    assert_eq!(received, vec!["hello"]);

    let mut sent = None;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::MessageSent(payload) = event.data {
            sent = Some(payload);
        }
    }
    assert_eq!(sent.unwrap().receiver_id, "u2");

    avery_chat.detach().await;
    blake_chat.detach().await;
    assert_eq!(backend.listener_count(), 0);
}

#[tokio::test]
async fn signed_out_user_cannot_open_screens() {
    let backend = backend().await;
    let avery = app(&backend, "u1", "Avery");
    avery.session().sign_out();

    assert!(matches!(avery.swipe_controller().await, Err(AppError::Validation(_))));
    let err = avery.open_chat("c1", "u2").await.err().unwrap();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

#[tokio::test]
async fn deck_skips_self_and_already_liked() {
    let backend = backend().await;
    backend
        .insert(Table::Profiles, vec![json!({ "id": "u3", "name": "Casey" })])
        .await
        .unwrap();
    let avery = app(&backend, "u1", "Avery");
    avery.engine().process_like("u1", "u2").await;

    let deck = avery.swipe_controller().await.unwrap();
    assert_eq!(deck.deck().current().unwrap().id, "u3");
    assert_eq!(deck.deck().remaining(), 1);
}
