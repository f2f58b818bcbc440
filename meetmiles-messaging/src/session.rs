//! Live view of one chat.
//!
//! A session owns the realtime subscription for its chat and processes
//! change events one at a time, in arrival order, through [`ChatSession::pump`]
//! or [`ChatSession::next_event`]. No ordering is assumed between message
//! inserts, message updates and typing changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;

use meetmiles_shared::clients::backend::{
    Backend, BackendError, BackendResult, ChangeEvent, ChangeKind, ChannelSpec, EventFilter,
    Operation, Subscription,
};
use meetmiles_shared::errors::{AppError, AppResult};
use meetmiles_shared::observability::{record_backend_error, MESSAGES_SENT_TOTAL};
use meetmiles_shared::types::event::EventBus;
use meetmiles_shared::types::query::{Filter, Query, Row, Table};

use crate::events::publisher;
use crate::models::{Message, TypingIndicator};
use crate::receipts;
use crate::timeline::{placeholder_id, ChatTimeline, TimelineEntry};
use crate::typing::{TypingDebouncer, DEFAULT_TYPING_IDLE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContext {
    pub chat_id: String,
    pub self_id: String,
    pub peer_id: String,
}

impl ChatContext {
    pub fn new(chat_id: &str, self_id: &str, peer_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            self_id: self_id.to_string(),
            peer_id: peer_id.to_string(),
        }
    }

    /// All three ids present; sending requires this.
    pub fn is_complete(&self) -> bool {
        !self.chat_id.is_empty() && !self.self_id.is_empty() && !self.peer_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub typing_idle: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            typing_idle: DEFAULT_TYPING_IDLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Guard failed (missing ids or blank text); nothing was written.
    Skipped,
    Sent { id: String },
    /// The placeholder stays in the timeline marked failed.
    Failed { placeholder_id: String },
}

/// What handling one realtime event changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    MessageAdded(String),
    MessageUpdated(String),
    Duplicate(String),
    TypingChanged,
    Ignored,
}

pub struct ChatSession<B: Backend> {
    backend: Arc<B>,
    ctx: ChatContext,
    timeline: ChatTimeline,
    typing_users: Vec<String>,
    input: String,
    typing: TypingDebouncer<B>,
    subscription: Option<Subscription>,
    bus: EventBus,
}

impl<B: Backend> ChatSession<B> {
    /// Subscribe, load history, stamp receipts and read current typing state.
    ///
    /// The subscription is opened before history is read so nothing inserted in
    /// between is missed; the overlap is deduplicated by id.
    pub async fn attach(
        backend: Arc<B>,
        ctx: ChatContext,
        settings: ChatSettings,
        bus: EventBus,
    ) -> AppResult<Self> {
        if ctx.chat_id.is_empty() || ctx.self_id.is_empty() {
            return Err(AppError::Validation(
                "chat session needs a chat id and a user id".into(),
            ));
        }

        let subscription = backend
            .subscribe(Self::channel(&ctx.chat_id))
            .await
            .inspect_err(|e| {
                record_backend_error(Table::Messages, Operation::Subscribe);
                tracing::error!(error = %e, chat_id = %ctx.chat_id, "failed to open chat channel");
            })?;

        let rows = backend
            .select(
                Query::from(Table::Messages)
                    .eq("chat_id", ctx.chat_id.as_str())
                    .order("created_at", true),
            )
            .await
            .inspect_err(|e| {
                record_backend_error(Table::Messages, Operation::Select);
                tracing::error!(error = %e, chat_id = %ctx.chat_id, "failed to load chat history");
            })?;

        let history: Vec<Message> = rows.into_iter().filter_map(parse_message).collect();

        let typing = TypingDebouncer::new(backend.clone(), &ctx.chat_id, &ctx.self_id, settings.typing_idle);
        let mut session = Self {
            backend,
            ctx,
            timeline: ChatTimeline::new(),
            typing_users: Vec::new(),
            input: String::new(),
            typing,
            subscription: Some(subscription),
            bus,
        };
        session.timeline.load(history);

        session.stamp_loaded_delivered().await;
        session.mark_seen().await;
        session.refresh_typing().await;

        tracing::info!(
            chat_id = %session.ctx.chat_id,
            user_id = %session.ctx.self_id,
            messages = session.timeline.len(),
            "chat session attached"
        );
        Ok(session)
    }

    fn channel(chat_id: &str) -> ChannelSpec {
        let in_chat = || Some(Filter::eq("chat_id", chat_id));
        ChannelSpec::new(format!("chat:{chat_id}"))
            .on(Table::Messages, EventFilter::Insert, in_chat())
            .on(Table::Messages, EventFilter::Update, in_chat())
            .on(Table::TypingIndicators, EventFilter::All, in_chat())
    }

    // --- accessors ---

    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        self.timeline.entries()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.timeline.messages()
    }

    pub fn timeline(&self) -> &ChatTimeline {
        &self.timeline
    }

    /// Other users currently typing in this chat.
    pub fn typing_users(&self) -> &[String] {
        &self.typing_users
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    // --- receipts ---

    async fn stamp_loaded_delivered(&mut self) {
        let ids: Vec<String> = self
            .timeline
            .messages()
            .filter(|m| m.is_for(&self.ctx.self_id) && m.delivered_at.is_none())
            .map(|m| m.id.clone())
            .collect();

        match receipts::stamp_delivered(self.backend.as_ref(), &ids, Utc::now()).await {
            Ok(rows) => self.apply_rows(rows),
            Err(e) => tracing::error!(error = %e, chat_id = %self.ctx.chat_id, "failed to stamp delivered"),
        }
    }

    /// Stamp every message received in this chat and not yet seen. Call on focus.
    pub async fn mark_seen(&mut self) {
        let result = receipts::mark_chat_seen(
            self.backend.as_ref(),
            &self.ctx.chat_id,
            &self.ctx.self_id,
            Utc::now(),
        )
        .await;

        match result {
            Ok(rows) => self.apply_rows(rows),
            Err(e) => tracing::error!(error = %e, chat_id = %self.ctx.chat_id, "failed to mark chat seen"),
        }
    }

    fn apply_rows(&mut self, rows: Vec<Row>) {
        for message in rows.into_iter().filter_map(parse_message) {
            self.timeline.apply_update(message);
        }
    }

    // --- typing ---

    /// Re-read the chat's typing rows. On failure the previous set is kept.
    pub async fn refresh_typing(&mut self) {
        let rows = match self
            .backend
            .select(Query::from(Table::TypingIndicators).eq("chat_id", self.ctx.chat_id.as_str()))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                record_backend_error(Table::TypingIndicators, Operation::Select);
                tracing::warn!(error = %e, chat_id = %self.ctx.chat_id, "failed to refresh typing state");
                return;
            }
        };

        let mut users: Vec<String> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<TypingIndicator>(row).ok())
            .filter(|t| t.is_typing && t.user_id != self.ctx.self_id)
            .map(|t| t.user_id)
            .collect();
        users.sort();
        users.dedup();
        self.typing_users = users;
    }

    pub async fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.typing.input_changed(&self.input).await;
    }

    // --- realtime ---

    pub async fn handle_event(&mut self, event: ChangeEvent) -> SessionUpdate {
        match (event.table, event.kind) {
            (Table::Messages, ChangeKind::Insert) => self.on_message_insert(event.new).await,
            (Table::Messages, ChangeKind::Update) => {
                let Some(message) = parse_message(event.new) else {
                    return SessionUpdate::Ignored;
                };
                let id = message.id.clone();
                if self.timeline.apply_update(message) {
                    SessionUpdate::MessageUpdated(id)
                } else {
                    SessionUpdate::Ignored
                }
            }
            (Table::TypingIndicators, _) => {
                self.refresh_typing().await;
                SessionUpdate::TypingChanged
            }
            _ => SessionUpdate::Ignored,
        }
    }

    async fn on_message_insert(&mut self, row: Row) -> SessionUpdate {
        let Some(message) = parse_message(row) else {
            return SessionUpdate::Ignored;
        };
        if message.chat_id != self.ctx.chat_id {
            return SessionUpdate::Ignored;
        }

        let id = message.id.clone();
        let needs_receipt = message.is_for(&self.ctx.self_id) && message.seen_at.is_none();
        if !self.timeline.apply_insert(message) {
            return SessionUpdate::Duplicate(id);
        }

        if needs_receipt {
            match receipts::stamp_received(self.backend.as_ref(), &id, Utc::now()).await {
                Ok(rows) => self.apply_rows(rows),
                Err(e) => tracing::error!(error = %e, message_id = %id, "failed to stamp received message"),
            }
        }
        SessionUpdate::MessageAdded(id)
    }

    /// Handle every event already queued, in arrival order.
    pub async fn pump(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.subscription.as_mut().and_then(Subscription::try_recv) {
            updates.push(self.handle_event(event).await);
        }
        updates
    }

    /// Wait for the next event and handle it. `None` once detached or the channel closed.
    pub async fn next_event(&mut self) -> Option<SessionUpdate> {
        let event = self.subscription.as_mut()?.recv().await?;
        Some(self.handle_event(event).await)
    }

    // --- sending ---

    pub async fn send_message(&mut self) -> SendOutcome {
        match self.stage_send() {
            Some(placeholder) => self.complete_send(placeholder).await,
            None => SendOutcome::Skipped,
        }
    }

    /// Optimistic half of a send: append a placeholder for the current input and clear it.
    /// `None` when the guard fails.
    pub fn stage_send(&mut self) -> Option<Message> {
        let content = self.input.trim();
        if !self.ctx.is_complete() || content.is_empty() {
            tracing::debug!(chat_id = %self.ctx.chat_id, "send skipped");
            return None;
        }

        let placeholder = Message {
            id: placeholder_id(),
            chat_id: self.ctx.chat_id.clone(),
            sender_id: self.ctx.self_id.clone(),
            receiver_id: self.ctx.peer_id.clone(),
            content: content.to_string(),
            content_type: "text".to_string(),
            created_at: Utc::now(),
            delivered_at: None,
            seen_at: None,
        };
        self.timeline.push_optimistic(placeholder.clone());
        self.input.clear();
        Some(placeholder)
    }

    /// Durable half of a send. Always ends with the typing indicator cleared.
    pub async fn complete_send(&mut self, placeholder: Message) -> SendOutcome {
        let outcome = self.deliver(placeholder).await;
        self.typing.clear().await;
        outcome
    }

    /// Re-send a failed placeholder through the same protocol.
    pub async fn retry_failed(&mut self, placeholder_id: &str) -> SendOutcome {
        match self.timeline.retry(placeholder_id) {
            Some(placeholder) => {
                tracing::info!(placeholder_id = %placeholder_id, "retrying failed message");
                self.deliver(placeholder).await
            }
            None => SendOutcome::Skipped,
        }
    }

    async fn insert_message(&self, placeholder: &Message) -> BackendResult<Message> {
        let row = placeholder.to_new().to_row()?;
        let inserted = self.backend.insert(Table::Messages, vec![row]).await?;
        let row = inserted.into_iter().next().ok_or_else(|| BackendError::Row {
            table: Table::Messages,
            message: "insert returned no row".into(),
        })?;
        Message::from_row(row)
    }

    async fn deliver(&mut self, placeholder: Message) -> SendOutcome {
        match self.insert_message(&placeholder).await {
            Ok(confirmed) => {
                let id = confirmed.id.clone();
                publisher::publish_message_sent(&self.bus, &confirmed);
                let how = self.timeline.confirm(&placeholder.id, confirmed);
                counter!(MESSAGES_SENT_TOTAL, "outcome" => "sent").increment(1);
                tracing::debug!(message_id = %id, placeholder_id = %placeholder.id, confirmation = ?how, "message sent");
                SendOutcome::Sent { id }
            }
            Err(e) => {
                record_backend_error(Table::Messages, Operation::Insert);
                counter!(MESSAGES_SENT_TOTAL, "outcome" => "failed").increment(1);
                tracing::error!(error = %e, chat_id = %self.ctx.chat_id, placeholder_id = %placeholder.id, "message send failed");
                self.timeline.fail(&placeholder.id);
                publisher::publish_message_failed(&self.bus, &placeholder, &e.to_string());
                SendOutcome::Failed {
                    placeholder_id: placeholder.id,
                }
            }
        }
    }

    /// Release the channel and clear this user's typing state.
    pub async fn detach(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.typing.close().await;
        tracing::info!(chat_id = %self.ctx.chat_id, user_id = %self.ctx.self_id, "chat session detached");
    }
}

fn parse_message(row: Row) -> Option<Message> {
    match Message::from_row(row) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed message row");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetmiles_shared::clients::memory::MemoryBackend;
    use meetmiles_shared::types::event::DomainEvent;

    async fn session(backend: &Arc<MemoryBackend>, ctx: ChatContext) -> ChatSession<MemoryBackend> {
        ChatSession::attach(backend.clone(), ctx, ChatSettings::default(), EventBus::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn attach_requires_ids() {
        let backend = Arc::new(MemoryBackend::new());
        let result = ChatSession::attach(
            backend.clone(),
            ChatContext::new("", "u1", "u2"),
            ChatSettings::default(),
            EventBus::new(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(backend.listener_count(), 0);
    }

    #[tokio::test]
    async fn blank_input_is_not_sent() {
        let backend = Arc::new(MemoryBackend::new());
        let mut chat = session(&backend, ChatContext::new("c1", "u1", "u2")).await;

        chat.set_input("   ").await;
        assert_eq!(chat.send_message().await, SendOutcome::Skipped);
        assert_eq!(chat.input(), "   ");
        assert!(chat.entries().is_empty());
        assert_eq!(backend.count(Table::Messages), 0);
    }

    #[tokio::test]
    async fn missing_peer_is_not_sent() {
        let backend = Arc::new(MemoryBackend::new());
        let mut chat = session(&backend, ChatContext::new("c1", "u1", "")).await;

        chat.set_input("hello").await;
        assert!(chat.stage_send().is_none());
        assert_eq!(backend.count(Table::Messages), 0);
    }

    #[tokio::test]
    async fn content_is_trimmed() {
        let backend = Arc::new(MemoryBackend::new());
        let mut chat = session(&backend, ChatContext::new("c1", "u1", "u2")).await;

        chat.set_input("  hi there \n").await;
        let SendOutcome::Sent { id } = chat.send_message().await else {
            panic!("expected a sent message");
        };
        assert_eq!(chat.input(), "");
        assert_eq!(chat.timeline().get(&id).unwrap().message.content, "hi there");
        assert_eq!(backend.rows(Table::Messages)[0]["content"], "hi there");
    }

    #[tokio::test]
    async fn failed_send_is_published() {
        let backend = Arc::new(MemoryBackend::new());
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let mut chat = ChatSession::attach(
            backend.clone(),
            ChatContext::new("c1", "u1", "u2"),
            ChatSettings::default(),
            bus,
        )
        .await
        .unwrap();

        backend.fail_next(Table::Messages, Operation::Insert);
        chat.set_input("hello").await;
        let SendOutcome::Failed { placeholder_id } = chat.send_message().await else {
            panic!("expected a failed send");
        };

        let event = events.try_recv().unwrap();
        match event.data {
            DomainEvent::MessageFailed(p) => assert_eq!(p.placeholder_id, placeholder_id),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
