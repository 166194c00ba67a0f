//! Centralized API error handling for TalentDesk
//!
//! Every service operation returns [`ApiResult`]. The variants map onto the
//! error taxonomy exposed to callers (validation, state conflict,
//! authorization, not found, external dependency) and carry a stable code,
//! an HTTP status and, where useful, a detail field for resynchronisation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Never carries detail: the caller only learns that the action is forbidden.
    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("State conflict: {message}")]
    StateConflict {
        message: String,
        current_state: String,
    },

    /// A reference collided with an existing one. Retried internally by
    /// the reference generator before it ever reaches a caller.
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External dependency error: {0}")]
    ExternalDependency(String),

    #[error("Validation error on '{field}': {message}")]
    ValidationError { field: String, message: String },
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn state_conflict(message: impl Into<String>, current_state: impl ToString) -> Self {
        ApiError::StateConflict {
            message: message.into(),
            current_state: current_state.to_string(),
        }
    }

    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::Conflict(_) | ApiError::DuplicateReference(_) => "CONFLICT",
            ApiError::StateConflict { .. } => "STATE_CONFLICT",
            ApiError::TooManyRequests => "TOO_MANY_REQUESTS",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ExternalDependency(_) => "EXTERNAL_DEPENDENCY_ERROR",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict(_)
            | ApiError::DuplicateReference(_)
            | ApiError::StateConflict { .. } => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::ExternalDependency(_) => StatusCode::BAD_GATEWAY,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::ValidationError { field, .. } => Some(field.clone()),
            ApiError::StateConflict { current_state, .. } => Some(current_state.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let internal = self.to_string();

        // Internal detail stays in the logs
        let message = match &self {
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                tracing::error!(error = %internal, code = %error_code, "Server error occurred");
                "An internal error occurred".to_string()
            }
            ApiError::ExternalDependency(_) => {
                tracing::error!(error = %internal, code = %error_code, "External dependency failed");
                internal
            }
            _ => {
                tracing::debug!(error = %internal, code = %error_code, "Client error occurred");
                internal
            }
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                unique_violation(db_err.constraint().unwrap_or_default())
            }
            _ => ApiError::DatabaseError(err.to_string()),
        }
    }
}

/// Error for a unique violation, by constraint. Constraints that back a
/// transition guard report the state the loser raced against.
fn unique_violation(constraint: &str) -> ApiError {
    match constraint {
        // Only a freshly inserted draft can race on this index
        "documents_one_active_invoice_idx" => ApiError::state_conflict(
            "Collaboration already has an active invoice",
            "BROUILLON",
        ),
        "negotiations_collaboration_id_key" | "collaborations_negotiation_id_key" => {
            ApiError::state_conflict("Negotiation was already converted", "VALIDEE")
        }
        c if c.ends_with("_reference_key") => ApiError::DuplicateReference(c.to_string()),
        c => ApiError::Conflict(format!("Unique constraint violated: {}", c)),
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "request".to_string());
        ApiError::ValidationError {
            field,
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::ExternalDependency(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ApiError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(ApiError::Forbidden.error_code(), "FORBIDDEN");
        assert_eq!(
            ApiError::state_conflict("already paid", "PAYE").error_code(),
            "STATE_CONFLICT"
        );
        assert_eq!(
            ApiError::validation("deliverables", "empty").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(ApiError::TooManyRequests.error_code(), "TOO_MANY_REQUESTS");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::NotFound("test".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::state_conflict("x", "ANNULE").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::DuplicateReference("documents_reference_key".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::ExternalDependency("renderer down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::validation("amount", "negative").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_details_expose_field_and_state_only() {
        assert_eq!(
            ApiError::validation("deliverables", "empty").details(),
            Some("deliverables".to_string())
        );
        assert_eq!(
            ApiError::state_conflict("cannot accept", "ANNULE").details(),
            Some("ANNULE".to_string())
        );
        assert_eq!(ApiError::Forbidden.details(), None);
        assert_eq!(ApiError::Forbidden.to_string(), "Forbidden");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_guard_constraints_map_to_state_conflict() {
        match unique_violation("documents_one_active_invoice_idx") {
            ApiError::StateConflict { current_state, .. } => assert_eq!(current_state, "BROUILLON"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            unique_violation("collaborations_negotiation_id_key"),
            ApiError::StateConflict { .. }
        ));
        assert!(matches!(
            unique_violation("documents_reference_key"),
            ApiError::DuplicateReference(_)
        ));
        assert!(matches!(
            unique_violation("users_email_key"),
            ApiError::Conflict(_)
        ));
    }
}
