//! Centralized API error taxonomy and response formatter.
//!
//! Every handler error funnels through `ApiError::into_response`, which
//! produces the `{message, stack?}` body shape — `stack` carries the
//! underlying error chain and is only included when the server runs outside
//! production.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::auth::RegisterError;
use crate::journal::ClassError;

/// Whether error responses include the `stack` field. Set once at startup
/// from the configured environment.
static EXPOSE_STACK: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

pub fn set_expose_stack(expose: bool) {
    EXPOSE_STACK.store(expose, std::sync::atomic::Ordering::Relaxed);
}

fn expose_stack() -> bool {
    EXPOSE_STACK.load(std::sync::atomic::Ordering::Relaxed)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed input. 400.
    #[error("{0}")]
    Validation(String),
    /// Uniqueness violation. 400 (matching the original duplicate-key mapping).
    #[error("{0}")]
    Conflict(String),
    /// Missing/invalid/expired token or bad credentials. 401.
    #[error("{0}")]
    Unauthorized(String),
    /// Resource absent or not owned — deliberately indistinguishable. 404.
    #[error("{0}")]
    NotFound(String),
    /// Media relay failure. 500.
    #[error("{0}")]
    Upload(String),
    /// Anything uncaught. 500 with a generic message.
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upload(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Detail for the optional `stack` field.
    fn stack(&self) -> Option<String> {
        match self {
            Self::Internal(e) => Some(format!("{e:#}")),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("API error ({status}): {self:#}");
        }

        let mut body = serde_json::json!({ "message": self.to_string() });
        if expose_stack() {
            if let Some(stack) = self.stack() {
                body["stack"] = serde_json::Value::String(stack);
            }
        }
        (status, Json(body)).into_response()
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Invalid(msg) => Self::Validation(msg),
            RegisterError::EmailTaken => Self::Conflict(e.to_string()),
            RegisterError::Storage(e) => Self::Internal(e),
        }
    }
}

impl From<ClassError> for ApiError {
    fn from(e: ClassError) -> Self {
        match e {
            ClassError::Invalid(msg) => Self::Validation(msg),
            ClassError::DuplicateName => Self::Conflict(e.to_string()),
            ClassError::Storage(e) => Self::Internal(e),
        }
    }
}
