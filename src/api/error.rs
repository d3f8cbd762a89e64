//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthError;
use crate::authorization::AuthorizationError;
use crate::billing::BillingError;
use crate::catalogue::CatalogueError;
use crate::db::DatabaseError;
use crate::patients::PatientError;
use crate::scheduling::SchedulingError;
use crate::state::StateError;
use crate::templates::TemplateError;
use crate::therapists::TherapistError;
use crate::validation::{FieldError, ValidationError};

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(ValidationError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut fields = None;
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid e-mail or password".to_string(),
            ),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail.clone()),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Rate limit exceeded. Retry after {retry_after}s"),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone()),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::Validation(err) => {
                fields = Some(err.errors.clone());
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION", err.to_string())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message, fields },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

// ── Domain error mapping ─────────────────────────────────

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DatabaseError::ConstraintViolation(detail) => ApiError::Conflict(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
            StateError::Database(e) => e.into(),
        }
    }
}

impl From<AuthorizationError> for ApiError {
    fn from(err: AuthorizationError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::EmailTaken => ApiError::Conflict(err.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(err.to_string()),
            AuthError::Forbidden(detail) => ApiError::Forbidden(detail),
            AuthError::Validation(v) => ApiError::Validation(v),
            AuthError::LockPoisoned => ApiError::Internal("session store lock".into()),
            AuthError::Database(e) => e.into(),
        }
    }
}

impl From<PatientError> for ApiError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PatientError::HasHistory => ApiError::Conflict(err.to_string()),
            PatientError::Validation(v) => ApiError::Validation(v),
            PatientError::Database(e) => e.into(),
        }
    }
}

impl From<TherapistError> for ApiError {
    fn from(err: TherapistError) -> Self {
        match err {
            TherapistError::NotFound(_) => ApiError::NotFound(err.to_string()),
            TherapistError::InvalidUserLink(..) => ApiError::Conflict(err.to_string()),
            TherapistError::Validation(v) => ApiError::Validation(v),
            TherapistError::Database(e) => e.into(),
        }
    }
}

impl From<CatalogueError> for ApiError {
    fn from(err: CatalogueError) -> Self {
        match err {
            CatalogueError::TreatmentNotFound(_) | CatalogueError::PackageNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            CatalogueError::Validation(v) => ApiError::Validation(v),
            CatalogueError::Database(e) => e.into(),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(_) => ApiError::NotFound(err.to_string()),
            TemplateError::Validation(v) => ApiError::Validation(v),
            TemplateError::Database(e) => e.into(),
        }
    }
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        use SchedulingError::*;
        match err {
            PatientNotFound(_) | TherapistNotFound(_) | PackageNotFound(_) | SaleNotFound(_)
            | SessionNotFound(_) | TreatmentNotFound(_) | TemplateNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            Validation(v) => ApiError::Validation(v),
            Database(e) => e.into(),
            _ => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotFound(_)
            | BillingError::PatientNotFound(_)
            | BillingError::SessionNotFound(_)
            | BillingError::SaleNotFound(_) => ApiError::NotFound(err.to_string()),
            BillingError::Immutable(_) => ApiError::Conflict(err.to_string()),
            BillingError::Validation(v) => ApiError::Validation(v),
            BillingError::Database(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use uuid::Uuid;

    async fn json_of(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_of(response).await["error"]["code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn rate_limited_returns_429_with_retry_after() {
        let response = ApiError::RateLimited { retry_after: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
        assert_eq!(json_of(response).await["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn validation_lists_fields() {
        let err = ValidationError::single("name", "is required");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_of(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION");
        assert_eq!(json["error"]["fields"][0]["field"], "name");
    }

    #[tokio::test]
    async fn internal_returns_500_and_hides_detail() {
        let response = ApiError::Internal("something broke".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_of(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
        assert!(json["error"].get("fields").is_none());
    }

    #[tokio::test]
    async fn domain_errors_map_to_statuses() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (PatientError::NotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND),
            (PatientError::HasHistory.into(), StatusCode::CONFLICT),
            (
                SchedulingError::InvalidTransition {
                    from: crate::models::SessionStatus::Completed,
                    to: crate::models::SessionStatus::Scheduled,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (SchedulingError::SessionNotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND),
            (SchedulingError::PackageExhausted(Uuid::nil()).into(), StatusCode::CONFLICT),
            (BillingError::Immutable(crate::models::BillStatus::Paid).into(), StatusCode::CONFLICT),
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED),
            (AuthError::EmailTaken.into(), StatusCode::CONFLICT),
            (DatabaseError::not_found("Bill", Uuid::nil()).into(), StatusCode::NOT_FOUND),
            (StateError::LockPoisoned.into(), StatusCode::INTERNAL_SERVER_ERROR),
            (
                DatabaseError::Io {
                    path: "/var/lib/therasuite".into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                }
                .into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
