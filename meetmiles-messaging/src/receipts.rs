//! Delivered/seen stamping.
//!
//! Every update only touches rows whose stamp is still null, so a stamp once
//! written is never moved or cleared. `seen_at` is always written after
//! `delivered_at` for the same rows.

use chrono::{DateTime, Utc};
use serde_json::json;

use meetmiles_shared::clients::backend::{Backend, BackendResult, Operation};
use meetmiles_shared::observability::record_backend_error;
use meetmiles_shared::types::query::{timestamp, Query, Row, Table};

async fn stamp<B: Backend>(backend: &B, query: Query, column: &str, at: DateTime<Utc>) -> BackendResult<Vec<Row>> {
    backend
        .update(query.is_null(column), json!({ column: timestamp(at) }))
        .await
        .inspect_err(|_| record_backend_error(Table::Messages, Operation::Update))
}

/// Stamp `delivered_at` on the given messages that do not have it yet.
pub async fn stamp_delivered<B: Backend>(backend: &B, ids: &[String], at: DateTime<Utc>) -> BackendResult<Vec<Row>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let query = Query::from(Table::Messages).in_list("id", ids.iter().map(String::as_str));
    stamp(backend, query, "delivered_at", at).await
}

/// A message observed live by its receiver: delivered and seen at the same instant.
pub async fn stamp_received<B: Backend>(backend: &B, message_id: &str, at: DateTime<Utc>) -> BackendResult<Vec<Row>> {
    let by_id = Query::from(Table::Messages).eq("id", message_id);
    let mut updated = stamp(backend, by_id.clone(), "delivered_at", at).await?;
    updated.extend(stamp(backend, by_id, "seen_at", at).await?);
    Ok(updated)
}

/// Everything `receiver_id` has in `chat_id` that is not seen yet becomes seen.
pub async fn mark_chat_seen<B: Backend>(
    backend: &B,
    chat_id: &str,
    receiver_id: &str,
    at: DateTime<Utc>,
) -> BackendResult<Vec<Row>> {
    let received = Query::from(Table::Messages)
        .eq("chat_id", chat_id)
        .eq("receiver_id", receiver_id);
    let mut updated = stamp(backend, received.clone(), "delivered_at", at).await?;
    updated.extend(stamp(backend, received, "seen_at", at).await?);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetmiles_shared::clients::memory::MemoryBackend;

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .insert(
                Table::Messages,
                vec![
                    json!({ "id": "m1", "chat_id": "c1", "sender_id": "u2", "receiver_id": "u1", "delivered_at": null, "seen_at": null }),
                    json!({ "id": "m2", "chat_id": "c1", "sender_id": "u2", "receiver_id": "u1", "delivered_at": "2024-01-01T00:00:00Z", "seen_at": null }),
                    json!({ "id": "m3", "chat_id": "c1", "sender_id": "u1", "receiver_id": "u2", "delivered_at": null, "seen_at": null }),
                    json!({ "id": "m4", "chat_id": "c2", "sender_id": "u2", "receiver_id": "u1", "delivered_at": null, "seen_at": null }),
                ],
            )
            .await
            .unwrap();
        backend
    }

    fn row<'a>(backend: &'a [Row], id: &str) -> &'a Row {
        backend.iter().find(|r| r["id"] == id).unwrap()
    }

    #[tokio::test]
    async fn delivered_only_fills_nulls() {
        let backend = seeded().await;
        let now = Utc::now();
        let updated = stamp_delivered(&backend, &["m1".to_string(), "m2".to_string()], now)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);

        let rows = backend.rows(Table::Messages);
        assert_eq!(row(&rows, "m1")["delivered_at"], timestamp(now));
        assert_eq!(row(&rows, "m2")["delivered_at"], "2024-01-01T00:00:00Z");
        assert!(stamp_delivered(&backend, &[], now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chat_seen_is_scoped_to_receiver_and_chat() {
        let backend = seeded().await;
        mark_chat_seen(&backend, "c1", "u1", Utc::now()).await.unwrap();

        let rows = backend.rows(Table::Messages);
        for id in ["m1", "m2"] {
            assert!(!row(&rows, id)["seen_at"].is_null());
            assert!(!row(&rows, id)["delivered_at"].is_null());
        }
        assert_eq!(row(&rows, "m2")["delivered_at"], "2024-01-01T00:00:00Z");
        assert!(row(&rows, "m3")["seen_at"].is_null());
        assert!(row(&rows, "m4")["seen_at"].is_null());
    }

    #[tokio::test]
    async fn received_sets_both_stamps_once() {
        let backend = seeded().await;
        let first = Utc::now();
        stamp_received(&backend, "m1", first).await.unwrap();
        let later = first + chrono::Duration::seconds(30);
        let again = stamp_received(&backend, "m1", later).await.unwrap();
        assert!(again.is_empty());

        let rows = backend.rows(Table::Messages);
        assert_eq!(row(&rows, "m1")["delivered_at"], timestamp(first));
        assert_eq!(row(&rows, "m1")["seen_at"], timestamp(first));
    }
}
