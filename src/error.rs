/// Unified error handling for the whole application.
///
/// Domain errors (validation, authentication, store) are kept as separate
/// enums so callers can distinguish "bad credential" from "backend down".
/// They converge into `AppError`, which maps onto the HTTP failure surface:
/// 400 for malformed input, 401 for any authentication failure, 404 for
/// missing resources, 409 for duplicates, 5xx for backend trouble.
///
/// A 401 body never reveals which authentication sub-reason occurred; the
/// distinction is preserved in logs only.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    BadInput(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::BadInput(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication failures.
///
/// Every variant maps to a uniform 401 on the wire; the variant itself is
/// only visible in internal logs. `Reused` marks a refresh token that was
/// signed by us and is unexpired but no longer lives in any principal's
/// session set, which is the detection signal for token replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    Malformed,
    Expired,
    SignatureInvalid,
    Reused,
    PrincipalGone,
    InvalidCredentials,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing authentication token"),
            AuthError::Malformed => write!(f, "malformed token"),
            AuthError::Expired => write!(f, "token has expired"),
            AuthError::SignatureInvalid => write!(f, "token signature is invalid"),
            AuthError::Reused => write!(f, "token is no longer active"),
            AuthError::PrincipalGone => write!(f, "token owner no longer exists"),
            AuthError::InvalidCredentials => write!(f, "invalid credentials"),
        }
    }
}

impl StdError for AuthError {}

/// Credential / post store failures.
///
/// `Unavailable` covers connection loss and bounded-I/O timeouts; it must
/// never be conflated with a credential failure on the way out.
#[derive(Debug)]
pub enum StoreError {
    Unavailable(String),
    DuplicateKey(String),
    Query(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            StoreError::DuplicateKey(msg) => write!(f, "duplicate entry: {}", msg),
            StoreError::Query(msg) => write!(f, "store query failed: {}", msg),
        }
    }
}

impl StdError for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                StoreError::DuplicateKey(err.to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Store(StoreError),
    NotFound(String),
    Conflict(String),
    AiUnavailable(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::NotFound(what) => write!(f, "{} not found", what),
            AppError::Conflict(msg) => write!(f, "{}", msg),
            AppError::AiUnavailable(msg) => write!(f, "content generation unavailable: {}", msg),
            AppError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for log correlation
    pub error_id: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Error code for client-side handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, status_code: u16, code: String, message: String) -> Self {
        Self {
            error_id,
            status_code,
            code,
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    /// The externally visible (status, code, message) triple.
    ///
    /// Authentication failures collapse to two messages: credential checks
    /// say "Invalid email or password" whether the account exists or not,
    /// and every token failure says only "Not authorized".
    fn response_parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),

            AppError::Auth(AuthError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            AppError::Auth(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Not authorized".to_string(),
            ),

            AppError::Store(StoreError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                "Service temporarily unavailable".to_string(),
            ),
            AppError::Store(StoreError::DuplicateKey(_)) => (
                StatusCode::CONFLICT,
                "DUPLICATE_ENTRY",
                "Resource already exists".to_string(),
            ),
            AppError::Store(StoreError::Query(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORE_ERROR",
                "Internal server error".to_string(),
            ),

            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", what),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::AiUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "AI_UNAVAILABLE",
                "Content generation temporarily unavailable".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }

    fn log(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                // Full variant lands in the logs; the response body stays uniform.
                tracing::warn!(error_id = error_id, reason = ?e, "Authentication failure");
            }
            AppError::Store(StoreError::DuplicateKey(e)) => {
                tracing::warn!(error_id = error_id, error = %e, "Duplicate entry attempt");
            }
            AppError::Store(e) => {
                tracing::error!(error_id = error_id, error = %e, "Store error");
            }
            AppError::NotFound(what) => {
                tracing::info!(error_id = error_id, resource = %what, "Resource not found");
            }
            AppError::Conflict(msg) => {
                tracing::warn!(error_id = error_id, error = %msg, "Conflict");
            }
            AppError::AiUnavailable(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "AI service error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let (status, code, message) = self.response_parts();
        let body = ErrorResponse::new(error_id, status.as_u16(), code.to_string(), message);

        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.response_parts().0
    }
}
