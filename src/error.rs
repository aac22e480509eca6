use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Coarse failure classes callers branch on.
///
/// `Unavailable` is the only retryable kind. `Conflict` is reserved for
/// uniqueness races the services reconcile internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Forbidden,
    Conflict,
    Unavailable,
    Internal,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Authentication failed")]
    AuthError,
    #[error("Invalid request: {0}")]
    InvalidArgument(String),
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),
    #[error("Invalid offer: {0}")]
    InvalidOffer(String),
    #[error("Invalid rating: {0}")]
    InvalidRating(String),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Not found")]
    NotFound,
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error("Not a participant of this conversation")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_)
            | Self::InvalidParticipants(_)
            | Self::InvalidOffer(_)
            | Self::InvalidRating(_)
            | Self::InvalidTransition { .. } => ErrorKind::InvalidArgument,
            Self::NotFound | Self::ConversationNotFound => ErrorKind::NotFound,
            Self::Unauthorized | Self::Forbidden | Self::AuthError => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Database(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => ErrorKind::Unavailable,
                _ => ErrorKind::Internal,
            },
            Self::Internal => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry the same request with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable)
    }

    #[must_use]
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Database(e) => {
                if self.kind() == ErrorKind::Unavailable {
                    tracing::warn!(error = %e, "Database unavailable");
                    (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
                } else {
                    tracing::error!(error = %e, "Database error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            }
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::InvalidTransition { .. } => {
                tracing::debug!(error = %self, "Rejected status transition");
                (StatusCode::CONFLICT, self.to_string())
            }
            Self::Unavailable(msg) => {
                tracing::warn!(message = %msg, "Dependency unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            other => {
                let status = match other.kind() {
                    ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                    ErrorKind::Conflict => StatusCode::CONFLICT,
                    ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                tracing::debug!(error = %other, status = status.as_u16(), "Request rejected");
                (status, other.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
