use std::sync::Arc;

use serde_json::json;

use meetmiles_app::{App, AppConfig, SessionStore};
use meetmiles_discovery::SwipeDirection;
use meetmiles_shared::clients::backend::Backend;
use meetmiles_shared::clients::memory::MemoryBackend;
use meetmiles_shared::observability::{init_metrics, init_tracing};
use meetmiles_shared::types::query::Table;

/// Two users in one process: Blake already liked Avery, Avery swipes right,
/// they match and exchange a message.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("meetmiles-app");
    let metrics = init_metrics()?;
    let config = AppConfig::load()?;

    let backend = Arc::new(MemoryBackend::new());
    backend
        .insert(
            Table::Profiles,
            vec![
                json!({ "id": "u1", "name": "Avery", "gender": "female", "photos": ["https://img.meetmiles.app/u1.jpg"] }),
                json!({ "id": "u2", "name": "Blake", "gender": "male", "photos": "[\"https://img.meetmiles.app/u2.jpg\"]",
                        "prompts": [{ "question": "Next trip?", "answer": "Lisbon" }] }),
                json!({ "id": "u3", "name": "Casey", "photos": "{https://img.meetmiles.app/u3.jpg}" }),
            ],
        )
        .await?;

    let avery = App::in_memory(config.clone(), backend.clone(), SessionStore::sign_in("u1", "Avery"));
    let blake = App::in_memory(config, backend.clone(), SessionStore::sign_in("u2", "Blake"));

    let mut events = avery.bus().subscribe();
    let observer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(event_type = %event.event_type, "event observed");
        }
    });

    let earlier = blake.engine().process_like("u2", "u1").await;
    tracing::info!(status = ?earlier.status, "blake liked avery");

    let mut deck = avery.swipe_controller().await?;
    if let Some(card) = deck.deck().current() {
        tracing::info!(profile = %card.name, pronouns = ?card.pronouns, photos = card.photos.len(), "top card");
    }
    deck.press(SwipeDirection::Right).await;
    let outcomes = deck.settle().await;

    let Some(chat_id) = outcomes.iter().find_map(|o| o.chat_id()).map(str::to_string) else {
        anyhow::bail!("expected the right swipe to produce a chat");
    };
    tracing::info!(chat_id = %chat_id, next = ?deck.deck().current().map(|c| &c.name), "matched");

    let mut avery_chat = avery.open_chat(&chat_id, "u2").await?;
    let mut blake_chat = blake.open_chat(&chat_id, "u1").await?;

    avery_chat.set_input("hello").await;
    let sent = avery_chat.send_message().await;
    tracing::info!(outcome = ?sent, "avery sent");

    blake_chat.pump().await;
    blake_chat.set_input("hey! where to next?").await;
    blake_chat.send_message().await;
    avery_chat.pump().await;

    for message in avery_chat.messages() {
        tracing::info!(
            from = %message.sender_id,
            content = %message.content,
            seen = message.seen_at.is_some(),
            "chat line"
        );
    }

    avery_chat.detach().await;
    blake_chat.detach().await;
    avery.session().sign_out();
    blake.session().sign_out();
    observer.abort();

    println!("{}", metrics.render());
    Ok(())
}
