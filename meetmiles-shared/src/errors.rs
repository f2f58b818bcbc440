use serde::{Deserialize, Serialize};

use crate::clients::backend::BackendError;
use crate::clients::push::PushError;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E2xxx: Discovery errors
/// - E3xxx: Matching errors
/// - E4xxx: Messaging errors
/// - E5xxx: Notification/push errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    BackendUnavailable,
    Conflict,
    ConfigInvalid,

    // Discovery (E2xxx)
    MalformedProfile,

    // Matching (E3xxx)
    CannotLikeSelf,

    // Messaging (E4xxx)
    SubscriptionFailed,

    // Notification (E5xxx)
    PushRejected,
    InvalidPushToken,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::BackendUnavailable => "E0003",
            Self::Conflict => "E0004",
            Self::ConfigInvalid => "E0005",

            // Discovery
            Self::MalformedProfile => "E2001",

            // Matching
            Self::CannotLikeSelf => "E3001",

            // Messaging
            Self::SubscriptionFailed => "E4001",

            // Notification
            Self::PushRejected => "E5001",
            Self::InvalidPushToken => "E5002",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal error")]
    Internal(#[from] anyhow::Error),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("push error: {0}")]
    Push(#[from] PushError),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// The stable code for this error, for logs and UI mapping.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Known { code, .. } => *code,
            Self::Internal(_) => ErrorCode::InternalError,
            Self::Backend(BackendError::Conflict { .. }) => ErrorCode::Conflict,
            Self::Backend(BackendError::ChannelClosed) => ErrorCode::SubscriptionFailed,
            Self::Backend(_) => ErrorCode::BackendUnavailable,
            Self::Push(PushError::InvalidToken(_)) => ErrorCode::InvalidPushToken,
            Self::Push(_) => ErrorCode::PushRejected,
            Self::Validation(_) => ErrorCode::ValidationError,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
