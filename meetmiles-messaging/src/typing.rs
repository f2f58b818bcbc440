use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meetmiles_shared::clients::backend::{Backend, BackendResult, Operation};
use meetmiles_shared::observability::record_backend_error;
use meetmiles_shared::types::query::{Table, UpsertOptions};

use crate::models::TypingIndicator;

pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_millis(1800);

async fn upsert_typing<B: Backend>(backend: &B, chat_id: &str, user_id: &str, is_typing: bool) -> BackendResult<()> {
    backend
        .upsert(
            Table::TypingIndicators,
            TypingIndicator::row(chat_id, user_id, is_typing),
            UpsertOptions::on_conflict(&["chat_id", "user_id"]),
        )
        .await
        .inspect_err(|_| record_backend_error(Table::TypingIndicators, Operation::Upsert))?;
    Ok(())
}

/// Debounced typing indicator for one (chat, user).
///
/// Only transitions are written: `true` on the first keystroke of a burst,
/// `false` once input has been idle for the configured window. Each keystroke
/// bumps a generation counter; an idle timer only fires if its generation is
/// still the latest.
pub struct TypingDebouncer<B: Backend> {
    backend: Arc<B>,
    chat_id: String,
    user_id: String,
    idle: Duration,
    typing: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    closed: bool,
}

impl<B: Backend> TypingDebouncer<B> {
    pub fn new(backend: Arc<B>, chat_id: &str, user_id: &str, idle: Duration) -> Self {
        Self {
            backend,
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
            idle,
            typing: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            closed: false,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.typing.load(Ordering::SeqCst)
    }

    pub async fn input_changed(&self, text: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if text.is_empty() {
            if self.typing.swap(false, Ordering::SeqCst) {
                self.write(false).await;
            }
            return;
        }

        if !self.typing.swap(true, Ordering::SeqCst) {
            self.write(true).await;
        }

        let backend = self.backend.clone();
        let typing = self.typing.clone();
        let latest = self.generation.clone();
        let chat_id = self.chat_id.clone();
        let user_id = self.user_id.clone();
        let idle = self.idle;

        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            if typing
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            if let Err(e) = upsert_typing(backend.as_ref(), &chat_id, &user_id, false).await {
                tracing::error!(error = %e, chat_id = %chat_id, "failed to clear idle typing indicator");
                return;
            }
            // A keystroke that landed during the write may have been overwritten.
            if latest.load(Ordering::SeqCst) != generation && typing.load(Ordering::SeqCst) {
                if let Err(e) = upsert_typing(backend.as_ref(), &chat_id, &user_id, true).await {
                    tracing::error!(error = %e, chat_id = %chat_id, "failed to restore typing indicator");
                }
            }
        });
    }

    /// Force `is_typing = false` now, whatever the local state.
    pub async fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.typing.store(false, Ordering::SeqCst);
        self.write(false).await;
    }

    /// Final clear; after this, dropping the debouncer writes nothing.
    pub async fn close(&mut self) {
        self.clear().await;
        self.closed = true;
    }

    async fn write(&self, is_typing: bool) {
        if let Err(e) = upsert_typing(self.backend.as_ref(), &self.chat_id, &self.user_id, is_typing).await {
            tracing::error!(error = %e, chat_id = %self.chat_id, is_typing, "failed to upsert typing indicator");
        }
    }
}

impl<B: Backend> Drop for TypingDebouncer<B> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.typing.store(false, Ordering::SeqCst);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(chat_id = %self.chat_id, "no runtime on drop, typing indicator left as is");
            return;
        };
        let backend = self.backend.clone();
        let chat_id = std::mem::take(&mut self.chat_id);
        let user_id = std::mem::take(&mut self.user_id);
        handle.spawn(async move {
            if let Err(e) = upsert_typing(backend.as_ref(), &chat_id, &user_id, false).await {
                tracing::error!(error = %e, chat_id = %chat_id, "failed to clear typing indicator on drop");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetmiles_shared::clients::backend::{ChangeEvent, ChannelSpec, EventFilter, Subscription};
    use meetmiles_shared::clients::memory::MemoryBackend;
    use meetmiles_shared::types::query::{Query, Row};

    async fn watch(backend: &MemoryBackend) -> Subscription {
        backend
            .subscribe(ChannelSpec::new("typing").on(Table::TypingIndicators, EventFilter::All, None))
            .await
            .unwrap()
    }

    fn drain(sub: &mut Subscription) -> Vec<bool> {
        std::iter::from_fn(|| sub.try_recv())
            .map(|e: ChangeEvent| e.new["is_typing"].as_bool().unwrap())
            .collect()
    }

    fn debouncer(backend: &Arc<MemoryBackend>) -> TypingDebouncer<MemoryBackend> {
        TypingDebouncer::new(backend.clone(), "c1", "u1", DEFAULT_TYPING_IDLE)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_produces_one_true_and_one_false() {
        let backend = Arc::new(MemoryBackend::new());
        let mut sub = watch(&backend).await;
        let typing = debouncer(&backend);

        for text in ["h", "he", "hel", "hell", "hello"] {
            typing.input_changed(text).await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(drain(&mut sub), vec![true]);
        assert!(typing.is_typing());

        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(drain(&mut sub), vec![false]);
        assert!(!typing.is_typing());

        // stale timers from the burst stay silent
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut sub).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_restarts_on_each_keystroke() {
        let backend = Arc::new(MemoryBackend::new());
        let mut sub = watch(&backend).await;
        let typing = debouncer(&backend);

        typing.input_changed("a").await;
        tokio::time::sleep(Duration::from_millis(1700)).await;
        typing.input_changed("ab").await;
        tokio::time::sleep(Duration::from_millis(1700)).await;
        assert_eq!(drain(&mut sub), vec![true]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(drain(&mut sub), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn emptied_input_clears_immediately() {
        let backend = Arc::new(MemoryBackend::new());
        let mut sub = watch(&backend).await;
        let typing = debouncer(&backend);

        typing.input_changed("hi").await;
        typing.input_changed("").await;
        assert_eq!(drain(&mut sub), vec![true, false]);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(drain(&mut sub).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_without_close_clears_indicator() {
        let backend = Arc::new(MemoryBackend::new());
        let mut sub = watch(&backend).await;

        let typing = debouncer(&backend);
        typing.input_changed("hi").await;
        drop(typing);
        tokio::task::yield_now().await;

        assert_eq!(drain(&mut sub), vec![true, false]);
        assert_eq!(backend.count(Table::TypingIndicators), 1);
    }

    /// Delays `is_typing = false` writes so a keystroke can land mid-write.
    struct SlowClear(MemoryBackend);

    impl Backend for SlowClear {
        async fn select(&self, query: Query) -> BackendResult<Vec<Row>> {
            self.0.select(query).await
        }

        async fn insert(&self, table: Table, rows: Vec<Row>) -> BackendResult<Vec<Row>> {
            self.0.insert(table, rows).await
        }

        async fn upsert(&self, table: Table, row: Row, options: UpsertOptions) -> BackendResult<Vec<Row>> {
            if row["is_typing"] == false {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.0.upsert(table, row, options).await
        }

        async fn update(&self, query: Query, patch: Row) -> BackendResult<Vec<Row>> {
            self.0.update(query, patch).await
        }

        async fn subscribe(&self, spec: ChannelSpec) -> BackendResult<Subscription> {
            self.0.subscribe(spec).await
        }
    }

    async fn stored_flag(backend: &SlowClear) -> bool {
        backend.0.rows(Table::TypingIndicators)[0]["is_typing"]
            .as_bool()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn keystroke_during_idle_clear_keeps_typing() {
        let backend = Arc::new(SlowClear(MemoryBackend::new()));
        let typing = TypingDebouncer::new(backend.clone(), "c1", "u1", DEFAULT_TYPING_IDLE);

        typing.input_changed("h").await;
        // idle timer fires at 1.8s and its clear lands at 1.9s
        tokio::time::sleep(Duration::from_millis(1850)).await;
        typing.input_changed("hi").await;
        assert!(typing.is_typing());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(stored_flag(&backend).await);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!stored_flag(&backend).await);
        assert!(!typing.is_typing());
    }

    #[tokio::test]
    async fn close_is_final() {
        let backend = Arc::new(MemoryBackend::new());
        let mut sub = watch(&backend).await;

        let mut typing = debouncer(&backend);
        typing.close().await;
        drop(typing);
        tokio::task::yield_now().await;

        assert_eq!(drain(&mut sub), vec![false]);
    }
}
