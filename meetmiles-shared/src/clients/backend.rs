//! The `Backend` collaborator: row-level CRUD plus realtime change channels.
//!
//! Everything above this seam speaks typed models; everything below it speaks
//! JSON rows. Implementations decide how rows are stored and how change
//! notifications are delivered.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::query::{Filter, Query, Row, Table, UpsertOptions};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("{table} row error: {message}")]
    Row { table: Table, message: String },

    #[error("expected at most one {table} row, got {count}")]
    MultipleRows { table: Table, count: usize },

    #[error("{table} row conflicts on ({columns})")]
    Conflict { table: Table, columns: String },

    #[error("row decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("realtime channel closed")]
    ChannelClosed,
}

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Upsert,
    Update,
    Subscribe,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Update => "update",
            Self::Subscribe => "subscribe",
        }
    }
}

// --- Realtime ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Which change kinds a binding listens for; `All` is the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Insert,
    Update,
    Delete,
    All,
}

impl EventFilter {
    pub fn accepts(&self, kind: ChangeKind) -> bool {
        matches!(
            (self, kind),
            (Self::All, _)
                | (Self::Insert, ChangeKind::Insert)
                | (Self::Update, ChangeKind::Update)
                | (Self::Delete, ChangeKind::Delete)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub new: Row,
    pub old: Option<Row>,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub table: Table,
    pub event: EventFilter,
    pub filter: Option<Filter>,
}

impl Binding {
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if self.table != event.table || !self.event.accepts(event.kind) {
            return false;
        }
        let subject = match event.kind {
            ChangeKind::Delete => event.old.as_ref().unwrap_or(&event.new),
            _ => &event.new,
        };
        self.filter.as_ref().map_or(true, |f| f.matches(subject))
    }
}

/// A logical realtime channel: a name plus the table/filter bindings it listens to.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub bindings: Vec<Binding>,
}

impl ChannelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn on(mut self, table: Table, event: EventFilter, filter: Option<Filter>) -> Self {
        self.bindings.push(Binding {
            table,
            event,
            filter,
        });
        self
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        self.bindings.iter().any(|b| b.accepts(event))
    }
}

/// Single-consumer queue of change events, delivered in arrival order.
///
/// Dropping the subscription releases the channel on the backend.
pub struct Subscription {
    name: String,
    receiver: mpsc::UnboundedReceiver<ChangeEvent>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<ChangeEvent>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            receiver,
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next event. `None` once the backend closed the channel.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    /// Take the next already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        tracing::debug!(channel = %self.name, "realtime channel released");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// --- Trait ---

/// Abstraction over the hosted backend.
///
/// Every call may fail independently. All methods return `Send` futures so
/// callers can hand work to spawned tasks.
pub trait Backend: Send + Sync + 'static {
    /// Rows of `query.table` matching every filter, ordered and limited as requested.
    fn select(&self, query: Query) -> impl Future<Output = BackendResult<Vec<Row>>> + Send + '_;

    /// Insert rows and return them as stored (with server-assigned `id` and `created_at`).
    fn insert(
        &self,
        table: Table,
        rows: Vec<Row>,
    ) -> impl Future<Output = BackendResult<Vec<Row>>> + Send + '_;

    /// Insert or merge on the conflict columns. With `ignore_duplicates` an
    /// existing row is left untouched and the result is empty.
    fn upsert(
        &self,
        table: Table,
        row: Row,
        options: UpsertOptions,
    ) -> impl Future<Output = BackendResult<Vec<Row>>> + Send + '_;

    /// Merge `patch` into every row matching `query` and return the updated rows.
    fn update(
        &self,
        query: Query,
        patch: Row,
    ) -> impl Future<Output = BackendResult<Vec<Row>>> + Send + '_;

    /// Open a realtime channel.
    fn subscribe(
        &self,
        spec: ChannelSpec,
    ) -> impl Future<Output = BackendResult<Subscription>> + Send + '_;

    /// Zero-or-one select. Zero rows is `Ok(None)`, more than one is an error.
    fn maybe_single(
        &self,
        query: Query,
    ) -> impl Future<Output = BackendResult<Option<Row>>> + Send + '_ {
        async move {
            let table = query.table;
            let mut rows = self.select(query).await?;
            match rows.len() {
                0 | 1 => Ok(rows.pop()),
                count => Err(BackendError::MultipleRows { table, count }),
            }
        }
    }
}
