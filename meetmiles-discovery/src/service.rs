use std::collections::HashSet;
use std::sync::Arc;

use meetmiles_shared::clients::backend::{Backend, Operation};
use meetmiles_shared::observability::record_backend_error;
use meetmiles_shared::types::query::{row_str, Query, Table};

use crate::profile::{CandidateProfile, PLACEHOLDER_PHOTO_URL};

/// Loads the candidate pool for one user.
pub struct DiscoveryService<B: Backend> {
    backend: Arc<B>,
    placeholder_photo: String,
}

impl<B: Backend> DiscoveryService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_placeholder(backend, PLACEHOLDER_PHOTO_URL)
    }

    pub fn with_placeholder(backend: Arc<B>, placeholder_photo: &str) -> Self {
        Self {
            backend,
            placeholder_photo: placeholder_photo.to_string(),
        }
    }

    /// Every profile except `self_id` and those it already liked.
    ///
    /// A failed profile read yields an empty pool; a failed likes read only
    /// loses the already-liked exclusion.
    pub async fn fetch_candidates(&self, self_id: &str) -> Vec<CandidateProfile> {
        let liked: HashSet<String> = match self
            .backend
            .select(Query::from(Table::Likes).eq("sender_id", self_id))
            .await
        {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| row_str(r, "receiver_id"))
                .map(str::to_string)
                .collect(),
            Err(e) => {
                record_backend_error(Table::Likes, Operation::Select);
                tracing::warn!(error = %e, user_id = %self_id, "failed to load sent likes");
                HashSet::new()
            }
        };

        let rows = match self
            .backend
            .select(Query::from(Table::Profiles).neq("id", self_id))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                record_backend_error(Table::Profiles, Operation::Select);
                tracing::error!(error = %e, user_id = %self_id, "failed to fetch candidate profiles");
                return Vec::new();
            }
        };

        let candidates: Vec<CandidateProfile> = rows
            .iter()
            .filter_map(|row| match CandidateProfile::from_row_with(row, &self.placeholder_photo) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed profile row");
                    None
                }
            })
            .filter(|p| !liked.contains(&p.id))
            .collect();

        tracing::debug!(user_id = %self_id, count = candidates.len(), "candidate pool fetched");
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetmiles_shared::clients::memory::MemoryBackend;
    use serde_json::json;

    async fn seeded() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .insert(
                Table::Profiles,
                vec![
                    json!({ "id": "u1", "name": "Me" }),
                    json!({ "id": "u2", "name": "Sam", "photos": null }),
                    json!({ "id": "u3", "name": "Alex" }),
                    json!({ "name": "no id" }),
                ],
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn excludes_self_and_already_liked() {
        let backend = seeded().await;
        backend
            .insert(Table::Likes, vec![json!({ "sender_id": "u1", "receiver_id": "u3" })])
            .await
            .unwrap();

        let service = DiscoveryService::new(backend);
        let pool = service.fetch_candidates("u1").await;
        let ids: Vec<_> = pool.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["u2"]);
        assert_eq!(pool[0].photos, vec![PLACEHOLDER_PHOTO_URL]);
    }

    #[tokio::test]
    async fn profile_read_failure_yields_empty_pool() {
        let backend = seeded().await;
        backend.fail_next(Table::Profiles, Operation::Select);
        let service = DiscoveryService::new(backend.clone());
        assert!(service.fetch_candidates("u1").await.is_empty());
        assert_eq!(service.fetch_candidates("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn likes_read_failure_keeps_pool() {
        let backend = seeded().await;
        backend
            .insert(Table::Likes, vec![json!({ "sender_id": "u1", "receiver_id": "u3" })])
            .await
            .unwrap();
        backend.fail_next(Table::Likes, Operation::Select);

        let service = DiscoveryService::new(backend);
        assert_eq!(service.fetch_candidates("u1").await.len(), 2);
    }
}
