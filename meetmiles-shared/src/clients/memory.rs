use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::backend::{
    Backend, BackendError, BackendResult, ChangeEvent, ChangeKind, ChannelSpec, Operation,
    Subscription,
};
use crate::types::query::{compare_values, timestamp, Query, Row, Table, UpsertOptions};

struct Listener {
    spec: ChannelSpec,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// In-process backend: tables in a `DashMap`, realtime fan-out over mpsc channels.
///
/// Change events are delivered to subscribers before the write call returns,
/// the same ordering a hosted backend gives when the realtime echo beats the
/// HTTP response.
pub struct MemoryBackend {
    tables: DashMap<Table, Vec<Row>>,
    unique_keys: HashMap<Table, Vec<Vec<String>>>,
    listeners: Arc<DashMap<u64, Listener>>,
    next_listener: AtomicU64,
    faults: DashMap<(Table, Operation), usize>,
}

impl MemoryBackend {
    /// A backend with the unique constraints the MeetMiles schema declares.
    pub fn new() -> Self {
        Self::empty()
            .with_unique(Table::Likes, &["sender_id", "receiver_id"])
            .with_unique(Table::Matches, &["pair_key"])
            .with_unique(Table::Chats, &["match_id"])
            .with_unique(Table::TypingIndicators, &["chat_id", "user_id"])
            .with_unique(Table::PushTokens, &["token"])
    }

    /// A backend without any unique constraint besides `id`.
    pub fn empty() -> Self {
        Self {
            tables: DashMap::new(),
            unique_keys: HashMap::new(),
            listeners: Arc::new(DashMap::new()),
            next_listener: AtomicU64::new(1),
            faults: DashMap::new(),
        }
    }

    pub fn with_unique(mut self, table: Table, columns: &[&str]) -> Self {
        self.unique_keys
            .entry(table)
            .or_default()
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Make the next `op` on `table` fail with `BackendError::Unavailable`.
    pub fn fail_next(&self, table: Table, op: Operation) {
        *self.faults.entry((table, op)).or_insert(0) += 1;
    }

    /// Snapshot of every row in `table`, in insertion order.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.tables
            .get(&table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, table: Table) -> usize {
        self.tables.get(&table).map_or(0, |rows| rows.len())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn take_fault(&self, table: Table, op: Operation) -> BackendResult<()> {
        if let Some(mut remaining) = self.faults.get_mut(&(table, op)) {
            if *remaining > 0 {
                *remaining -= 1;
                tracing::debug!(table = %table, op = op.as_str(), "injected backend fault");
                return Err(BackendError::Unavailable(format!(
                    "injected {} fault on {table}",
                    op.as_str()
                )));
            }
        }
        Ok(())
    }

    fn notify(&self, events: Vec<ChangeEvent>) {
        for event in events {
            for listener in self.listeners.iter() {
                if listener.spec.accepts(&event) {
                    // A closed receiver is released by its own drop; nothing to do here.
                    let _ = listener.tx.send(event.clone());
                }
            }
        }
    }

    fn prepare(table: Table, row: Row) -> BackendResult<Map<String, Value>> {
        let mut object = match row {
            Value::Object(object) => object,
            other => {
                return Err(BackendError::Row {
                    table,
                    message: format!("expected an object row, got {other}"),
                })
            }
        };
        if object.get("id").map_or(true, Value::is_null) {
            object.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        if object.get("created_at").map_or(true, Value::is_null) {
            object.insert("created_at".into(), timestamp(Utc::now()));
        }
        Ok(object)
    }

    fn same_key(a: &Row, b: &Row, columns: &[String]) -> bool {
        columns.iter().all(|c| {
            let va = a.get(c).filter(|v| !v.is_null());
            let vb = b.get(c).filter(|v| !v.is_null());
            va.is_some() && va == vb
        })
    }

    fn check_unique(&self, table: Table, rows: &[Row], candidate: &Row, skip: Option<usize>) -> BackendResult<()> {
        let id_key = vec!["id".to_string()];
        let keys = self.unique_keys.get(&table);
        let all_keys = std::iter::once(&id_key).chain(keys.into_iter().flatten());
        for columns in all_keys {
            let clash = rows
                .iter()
                .enumerate()
                .any(|(i, existing)| Some(i) != skip && Self::same_key(existing, candidate, columns));
            if clash {
                return Err(BackendError::Conflict {
                    table,
                    columns: columns.join(","),
                });
            }
        }
        Ok(())
    }

    fn merge(target: &mut Row, patch: &Map<String, Value>) {
        if let Value::Object(object) = target {
            for (k, v) in patch {
                object.insert(k.clone(), v.clone());
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    async fn select(&self, query: Query) -> BackendResult<Vec<Row>> {
        self.take_fault(query.table, Operation::Select)?;

        let mut rows: Vec<Row> = self
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> BackendResult<Vec<Row>> {
        self.take_fault(table, Operation::Insert)?;

        let mut inserted = Vec::with_capacity(rows.len());
        {
            let mut stored = self.tables.entry(table).or_default();
            let mut staged: Vec<Row> = Vec::with_capacity(rows.len());
            for row in rows {
                let row = Value::Object(Self::prepare(table, row)?);
                self.check_unique(table, &stored, &row, None)?;
                self.check_unique(table, &staged, &row, None)?;
                staged.push(row);
            }
            stored.extend(staged.iter().cloned());
            inserted.extend(staged);
        }

        tracing::trace!(table = %table, count = inserted.len(), "rows inserted");
        self.notify(
            inserted
                .iter()
                .map(|row| ChangeEvent {
                    table,
                    kind: ChangeKind::Insert,
                    new: row.clone(),
                    old: None,
                })
                .collect(),
        );
        Ok(inserted)
    }

    async fn upsert(&self, table: Table, row: Row, options: UpsertOptions) -> BackendResult<Vec<Row>> {
        self.take_fault(table, Operation::Upsert)?;

        let conflict = if options.on_conflict.is_empty() {
            vec!["id".to_string()]
        } else {
            options.on_conflict.clone()
        };

        let event = {
            let mut stored = self.tables.entry(table).or_default();
            let existing = stored
                .iter()
                .position(|r| Self::same_key(r, &row, &conflict));

            match existing {
                Some(_) if options.ignore_duplicates => None,
                Some(index) => {
                    let patch = match &row {
                        Value::Object(object) => {
                            let mut object = object.clone();
                            // the stored row keeps its identity
                            object.remove("id");
                            object.remove("created_at");
                            object
                        }
                        other => {
                            return Err(BackendError::Row {
                                table,
                                message: format!("expected an object row, got {other}"),
                            })
                        }
                    };
                    let old = stored[index].clone();
                    let mut merged = old.clone();
                    Self::merge(&mut merged, &patch);
                    self.check_unique(table, &stored, &merged, Some(index))?;
                    stored[index] = merged.clone();
                    Some(ChangeEvent {
                        table,
                        kind: ChangeKind::Update,
                        new: merged,
                        old: Some(old),
                    })
                }
                None => {
                    let row = Value::Object(Self::prepare(table, row)?);
                    self.check_unique(table, &stored, &row, None)?;
                    stored.push(row.clone());
                    Some(ChangeEvent {
                        table,
                        kind: ChangeKind::Insert,
                        new: row,
                        old: None,
                    })
                }
            }
        };

        match event {
            Some(event) => {
                let row = event.new.clone();
                self.notify(vec![event]);
                Ok(vec![row])
            }
            None => {
                tracing::trace!(table = %table, "upsert ignored duplicate");
                Ok(Vec::new())
            }
        }
    }

    async fn update(&self, query: Query, patch: Row) -> BackendResult<Vec<Row>> {
        let table = query.table;
        self.take_fault(table, Operation::Update)?;

        let patch = match patch {
            Value::Object(object) => object,
            other => {
                return Err(BackendError::Row {
                    table,
                    message: format!("expected an object patch, got {other}"),
                })
            }
        };

        let events: Vec<ChangeEvent> = {
            let mut stored = self.tables.entry(table).or_default();
            let mut events = Vec::new();
            for row in stored.iter_mut().filter(|r| query.matches(r)) {
                let old = row.clone();
                Self::merge(row, &patch);
                events.push(ChangeEvent {
                    table,
                    kind: ChangeKind::Update,
                    new: row.clone(),
                    old: Some(old),
                });
            }
            events
        };

        let updated = events.iter().map(|e| e.new.clone()).collect();
        self.notify(events);
        Ok(updated)
    }

    async fn subscribe(&self, spec: ChannelSpec) -> BackendResult<Subscription> {
        for table in spec.bindings.iter().map(|b| b.table) {
            self.take_fault(table, Operation::Subscribe)?;
        }

        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let name = spec.name.clone();
        self.listeners.insert(id, Listener { spec, tx });
        tracing::debug!(channel = %name, listener = id, "realtime channel opened");

        let listeners = self.listeners.clone();
        Ok(Subscription::new(name, rx, move || {
            listeners.remove(&id);
        }))
    }
}
