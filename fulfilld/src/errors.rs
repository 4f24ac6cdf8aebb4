use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided or invalid
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Internal/admin shared secret mismatch
    #[error("Forbidden")]
    Forbidden,

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict with existing state (one-active-node, trial already used, ...)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Per-user rate limit window exceeded
    #[error("{message}")]
    TooManyRequests { message: String },

    /// Downstream provider returned a non-success response
    #[error("{provider}: {message}")]
    ProviderFailed { provider: &'static str, message: String },

    /// Deadline exhausted waiting on a downstream provider
    #[error("timed out while {operation}")]
    Timeout { operation: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ProviderFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal details.
    ///
    /// Provider errors in particular can carry upstream response bodies with
    /// node credentials in them; those never reach the caller.
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message
                .clone()
                .unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden => "Forbidden".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} {id} not found"),
            Error::Conflict { message } => message.clone(),
            Error::TooManyRequests { message } => message.clone(),
            Error::ProviderFailed { provider, .. } => {
                format!("Upstream {provider} request failed")
            }
            Error::Timeout { operation } => format!("Timed out while {operation}"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, .. } => {
                    match constraint.as_deref() {
                        Some(c) if c.starts_with("vpn_provisions_trial_") => {
                            "trial already used".to_string()
                        }
                        _ => "Resource already exists".to_string(),
                    }
                }
                DbError::ForeignKeyViolation { .. } => {
                    "Invalid reference to related resource".to_string()
                }
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::ProviderFailed { .. } | Error::Timeout { .. } => {
                tracing::error!("Upstream provider error: {}", self);
            }
            Error::Database(_) | Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::TooManyRequests { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({ "error": self.user_message() });
        (status, axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::Conflict {
                message: "x".into()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::TooManyRequests {
                message: "x".into()
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(Error::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::Timeout {
                operation: "waiting for node".into()
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("vpn_provisions_trial_user_uniq".to_string()),
            table: Some("vpn_provisions".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.user_message(), "trial already used");
    }

    #[test]
    fn test_provider_error_is_redacted() {
        let err = Error::ProviderFailed {
            provider: "hosting-service",
            message: "status 500: api_key=abc123".to_string(),
        };
        assert!(!err.user_message().contains("abc123"));
    }
}
