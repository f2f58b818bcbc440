use std::sync::Arc;

use meetmiles_shared::clients::backend::{Backend, BackendResult, Operation};
use meetmiles_shared::clients::push::{PushDispatcher, PushMessage};
use meetmiles_shared::errors::AppError;
use meetmiles_shared::observability::{record_backend_error, record_push};
use meetmiles_shared::types::query::{Query, Table};

use crate::models::{from_row, to_row, Notification, NotificationKind, PushToken};

/// Result of pushing to every device of one user.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PushReport {
    pub sent: usize,
    pub failed: Vec<String>,
}

/// Writes notification rows and fans pushes out to a user's devices.
pub struct Notifier<B: Backend, P: PushDispatcher> {
    backend: Arc<B>,
    push: Arc<P>,
}

impl<B: Backend, P: PushDispatcher> Notifier<B, P> {
    pub fn new(backend: Arc<B>, push: Arc<P>) -> Self {
        Self { backend, push }
    }

    /// Insert one notification row for `user_id`.
    pub async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> BackendResult<()> {
        let notification = Notification {
            id: None,
            user_id: user_id.to_string(),
            kind,
            title: title.to_string(),
            body: body.to_string(),
            data,
            is_read: false,
        };

        self.backend
            .insert(Table::Notifications, vec![to_row(&notification)?])
            .await
            .inspect_err(|_| record_backend_error(Table::Notifications, Operation::Insert))?;

        tracing::debug!(
            user_id = %user_id,
            notification_type = kind.as_str(),
            "notification created"
        );
        Ok(())
    }

    pub async fn tokens_for(&self, user_id: &str) -> BackendResult<Vec<PushToken>> {
        let rows = self
            .backend
            .select(Query::from(Table::PushTokens).eq("user_id", user_id))
            .await
            .inspect_err(|_| record_backend_error(Table::PushTokens, Operation::Select))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match from_row::<PushToken>(row) {
                Ok(token) => Some(token),
                Err(e) => {
                    tracing::warn!(error = %e, user_id = %user_id, "skipping malformed push token row");
                    None
                }
            })
            .collect())
    }

    /// Push to every registered device of `user_id`. Dispatch failures are logged and counted, never raised.
    pub async fn push_user(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> BackendResult<PushReport> {
        let tokens = self.tokens_for(user_id).await?;
        let mut report = PushReport::default();

        for token in tokens {
            let mut message = PushMessage::new(&token.token, title, body);
            if let Some(data) = &data {
                message = message.with_data(data.clone());
            }

            match self.push.send(message).await {
                Ok(()) => {
                    record_push("sent");
                    report.sent += 1;
                }
                Err(e) => {
                    record_push("failed");
                    let err = AppError::from(e);
                    let code = err.code().code();
                    tracing::warn!(error = %err, code, user_id = %user_id, "push dispatch failed");
                    report.failed.push(format!("{code}: {err}"));
                }
            }
        }

        Ok(report)
    }
}
