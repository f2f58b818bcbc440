//! The like → reciprocity → match protocol.
//!
//! Every step is best-effort: a failed step is logged and recorded in the
//! returned [`MatchOutcome`], and the chain continues wherever the next step
//! does not depend on the failed one. Nothing is rolled back or retried.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use serde_json::json;

use meetmiles_discovery::LikeHandler;
use meetmiles_shared::clients::backend::{Backend, Operation};
use meetmiles_shared::clients::push::PushDispatcher;
use meetmiles_shared::errors::ErrorCode;
use meetmiles_shared::observability::{record_backend_error, LIKES_TOTAL, MATCHES_TOTAL};
use meetmiles_shared::types::event::EventBus;
use meetmiles_shared::types::query::{row_str, Query, Row, Table, UpsertOptions};

use crate::events::publisher;
use crate::models::{pair_key, to_row, Chat, Like, Match, NotificationKind};
use crate::notifier::Notifier;

const MATCH_TITLE: &str = "It's a match!";
const MATCH_BODY: &str = "You both liked each other. Say hi!";
const LIKE_TITLE: &str = "Someone likes you";
const LIKE_BODY: &str = "You have a new like. Keep swiping to find out who!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStatus {
    /// Self-like or missing ids; nothing was written.
    Skipped { reason: ErrorCode },
    /// No reciprocal like. The like row itself may still be listed in the failures.
    LikeRecorded,
    Matched {
        match_id: String,
        chat_id: Option<String>,
    },
    /// The pair already had a match, either from before or from a concurrent insert.
    AlreadyMatched {
        match_id: String,
        chat_id: Option<String>,
    },
    /// The chain stopped early because a step it depends on failed.
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStep {
    RecordLike,
    ReciprocityCheck,
    FindMatch,
    CreateMatch,
    CreateChat,
    Notify,
    PushLookup,
    PushDispatch,
}

impl MatchStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordLike => "record_like",
            Self::ReciprocityCheck => "reciprocity_check",
            Self::FindMatch => "find_match",
            Self::CreateMatch => "create_match",
            Self::CreateChat => "create_chat",
            Self::Notify => "notify",
            Self::PushLookup => "push_lookup",
            Self::PushDispatch => "push_dispatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: MatchStep,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub status: MatchStatus,
    pub failures: Vec<StepFailure>,
    pub pushes_sent: usize,
}

impl MatchOutcome {
    fn new() -> Self {
        Self {
            status: MatchStatus::Incomplete,
            failures: Vec::new(),
            pushes_sent: 0,
        }
    }

    fn fail(&mut self, step: MatchStep, error: impl fmt::Display) {
        let error = error.to_string();
        tracing::error!(step = step.as_str(), error = %error, "match chain step failed");
        self.failures.push(StepFailure { step, error });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn match_id(&self) -> Option<&str> {
        match &self.status {
            MatchStatus::Matched { match_id, .. } | MatchStatus::AlreadyMatched { match_id, .. } => {
                Some(match_id)
            }
            _ => None,
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        match &self.status {
            MatchStatus::Matched { chat_id, .. } | MatchStatus::AlreadyMatched { chat_id, .. } => {
                chat_id.as_deref()
            }
            _ => None,
        }
    }
}

fn row_id(row: &Row) -> Option<String> {
    row_str(row, "id").map(str::to_string)
}

pub struct MatchEngine<B: Backend, P: PushDispatcher> {
    backend: Arc<B>,
    notifier: Notifier<B, P>,
    bus: EventBus,
}

impl<B: Backend, P: PushDispatcher> MatchEngine<B, P> {
    pub fn new(backend: Arc<B>, push: Arc<P>, bus: EventBus) -> Self {
        Self {
            notifier: Notifier::new(backend.clone(), push),
            backend,
            bus,
        }
    }

    /// Record a like from `self_id` to `candidate_id` and, if it is mutual,
    /// create the match, its chat, and notify both sides.
    ///
    /// Never returns an error; see [`MatchOutcome::failures`].
    pub async fn process_like(&self, self_id: &str, candidate_id: &str) -> MatchOutcome {
        let mut outcome = MatchOutcome::new();

        let skip = if self_id.is_empty() || candidate_id.is_empty() {
            Some(ErrorCode::ValidationError)
        } else if self_id == candidate_id {
            Some(ErrorCode::CannotLikeSelf)
        } else {
            None
        };
        if let Some(reason) = skip {
            tracing::warn!(user_id = %self_id, candidate_id = %candidate_id, code = reason.code(), "like skipped");
            outcome.status = MatchStatus::Skipped { reason };
            return outcome;
        }

        match self.record_like(self_id, candidate_id).await {
            Ok(()) => {
                counter!(LIKES_TOTAL).increment(1);
                publisher::publish_like_sent(&self.bus, self_id, candidate_id);
            }
            Err(e) => outcome.fail(MatchStep::RecordLike, e),
        }

        let reciprocal = self
            .backend
            .maybe_single(
                Query::from(Table::Likes)
                    .eq("sender_id", candidate_id)
                    .eq("receiver_id", self_id),
            )
            .await;

        match reciprocal {
            Ok(Some(_)) => self.on_mutual(self_id, candidate_id, &mut outcome).await,
            Ok(None) => self.on_one_sided(self_id, candidate_id, &mut outcome).await,
            Err(e) => {
                record_backend_error(Table::Likes, Operation::Select);
                outcome.fail(MatchStep::ReciprocityCheck, e);
                outcome.status = MatchStatus::Incomplete;
            }
        }

        tracing::info!(
            user_id = %self_id,
            candidate_id = %candidate_id,
            status = ?outcome.status,
            failures = outcome.failures.len(),
            "like processed"
        );
        outcome
    }

    async fn record_like(&self, self_id: &str, candidate_id: &str) -> anyhow::Result<()> {
        let row = to_row(&Like::new(self_id, candidate_id))?;
        self.backend
            .upsert(
                Table::Likes,
                row,
                UpsertOptions::on_conflict(&["sender_id", "receiver_id"]),
            )
            .await
            .inspect_err(|_| record_backend_error(Table::Likes, Operation::Upsert))?;
        Ok(())
    }

    /// Existing match for the pair, checking both orderings.
    pub async fn find_match(&self, a: &str, b: &str) -> anyhow::Result<Option<String>> {
        for (user1, user2) in [(a, b), (b, a)] {
            let found = self
                .backend
                .maybe_single(Query::from(Table::Matches).eq("user1", user1).eq("user2", user2))
                .await
                .inspect_err(|_| record_backend_error(Table::Matches, Operation::Select))?;
            if let Some(row) = found {
                return Ok(row_id(&row));
            }
        }
        Ok(None)
    }

    async fn on_mutual(&self, self_id: &str, candidate_id: &str, outcome: &mut MatchOutcome) {
        let existing = match self.find_match(self_id, candidate_id).await {
            Ok(existing) => existing,
            Err(e) => {
                // the pair_key upsert below still guards against a duplicate
                outcome.fail(MatchStep::FindMatch, e);
                None
            }
        };

        if let Some(match_id) = existing {
            tracing::info!(match_id = %match_id, "pair already matched");
            let chat_id = self.ensure_chat(&match_id, outcome).await;
            outcome.status = MatchStatus::AlreadyMatched { match_id, chat_id };
            return;
        }

        let match_id = match self.create_match(self_id, candidate_id).await {
            Ok(Created::New(id)) => id,
            Ok(Created::Existing(match_id)) => {
                let chat_id = self.ensure_chat(&match_id, outcome).await;
                outcome.status = MatchStatus::AlreadyMatched { match_id, chat_id };
                return;
            }
            Err(e) => {
                outcome.fail(MatchStep::CreateMatch, e);
                outcome.status = MatchStatus::Incomplete;
                return;
            }
        };

        counter!(MATCHES_TOTAL).increment(1);
        let chat_id = self.ensure_chat(&match_id, outcome).await;

        let data = json!({
            "type": NotificationKind::Match.as_str(),
            "match_id": match_id,
            "chat_id": chat_id,
        });
        for (user_id, other_id) in [(self_id, candidate_id), (candidate_id, self_id)] {
            let mut data = data.clone();
            data["other_user_id"] = json!(other_id);
            if let Err(e) = self
                .notifier
                .notify(user_id, NotificationKind::Match, MATCH_TITLE, MATCH_BODY, Some(data))
                .await
            {
                outcome.fail(MatchStep::Notify, e);
            }
        }

        self.push(candidate_id, MATCH_TITLE, MATCH_BODY, data, outcome).await;

        publisher::publish_match_created(&self.bus, &match_id, chat_id.as_deref(), self_id, candidate_id);
        outcome.status = MatchStatus::Matched { match_id, chat_id };
    }

    async fn on_one_sided(&self, self_id: &str, candidate_id: &str, outcome: &mut MatchOutcome) {
        let data = json!({ "type": NotificationKind::Like.as_str() });

        if let Err(e) = self
            .notifier
            .notify(candidate_id, NotificationKind::Like, LIKE_TITLE, LIKE_BODY, Some(data.clone()))
            .await
        {
            outcome.fail(MatchStep::Notify, e);
        }

        self.push(candidate_id, LIKE_TITLE, LIKE_BODY, data, outcome).await;
        tracing::debug!(user_id = %self_id, candidate_id = %candidate_id, "like is one-sided");
        outcome.status = MatchStatus::LikeRecorded;
    }

    async fn push(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
        outcome: &mut MatchOutcome,
    ) {
        match self.notifier.push_user(user_id, title, body, Some(data)).await {
            Ok(report) => {
                outcome.pushes_sent += report.sent;
                for error in report.failed {
                    outcome.failures.push(StepFailure {
                        step: MatchStep::PushDispatch,
                        error,
                    });
                }
            }
            Err(e) => outcome.fail(MatchStep::PushLookup, e),
        }
    }

    async fn create_match(&self, self_id: &str, candidate_id: &str) -> anyhow::Result<Created> {
        let key = pair_key(self_id, candidate_id);
        let row = to_row(&Match::new(self_id, candidate_id))?;
        let inserted = self
            .backend
            .upsert(
                Table::Matches,
                row,
                UpsertOptions::on_conflict(&["pair_key"]).ignore_duplicates(),
            )
            .await
            .inspect_err(|_| record_backend_error(Table::Matches, Operation::Upsert))?;

        if let Some(id) = inserted.first().and_then(row_id) {
            tracing::info!(match_id = %id, pair_key = %key, "match created");
            return Ok(Created::New(id));
        }

        // the other side's insert won; reuse its row
        tracing::warn!(pair_key = %key, "match insert lost a race, reusing existing match");
        let existing = self
            .backend
            .maybe_single(Query::from(Table::Matches).eq("pair_key", key.as_str()))
            .await
            .inspect_err(|_| record_backend_error(Table::Matches, Operation::Select))?;

        existing
            .as_ref()
            .and_then(row_id)
            .map(Created::Existing)
            .ok_or_else(|| anyhow::anyhow!("match insert for {key} returned no row and none exists"))
    }

    /// Chat for `match_id`, created if missing. At most one chat per match.
    async fn ensure_chat(&self, match_id: &str, outcome: &mut MatchOutcome) -> Option<String> {
        let chat = Chat {
            id: None,
            match_id: match_id.to_string(),
        };
        let row = match to_row(&chat) {
            Ok(row) => row,
            Err(e) => {
                outcome.fail(MatchStep::CreateChat, e);
                return None;
            }
        };

        let inserted = self
            .backend
            .upsert(
                Table::Chats,
                row,
                UpsertOptions::on_conflict(&["match_id"]).ignore_duplicates(),
            )
            .await;

        let result = match inserted {
            Ok(rows) if !rows.is_empty() => Ok(rows.first().and_then(row_id)),
            Ok(_) => self
                .backend
                .maybe_single(Query::from(Table::Chats).eq("match_id", match_id))
                .await
                .map(|row| row.as_ref().and_then(row_id))
                .inspect_err(|_| record_backend_error(Table::Chats, Operation::Select)),
            Err(e) => {
                record_backend_error(Table::Chats, Operation::Upsert);
                Err(e)
            }
        };

        match result {
            Ok(chat_id) => chat_id,
            Err(e) => {
                outcome.fail(MatchStep::CreateChat, e);
                None
            }
        }
    }
}

enum Created {
    New(String),
    Existing(String),
}

impl<B: Backend, P: PushDispatcher> LikeHandler for MatchEngine<B, P> {
    type Output = MatchOutcome;

    async fn handle_like(&self, self_id: String, candidate_id: String) -> MatchOutcome {
        self.process_like(&self_id, &candidate_id).await
    }
}
