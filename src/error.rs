/// Error handling for the authentication service.
///
/// Domain-specific error enums map into a unified `AppError`; the actix
/// integration translates each kind into a stable machine-readable code and
/// HTTP status. Storage internals never leak into responses, and every
/// refresh-flow failure clears the rotation cookie on the client.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

use crate::routes::auth::removal_cookie;

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} bytes)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
        }
    }
}

impl StdError for ValidationError {}

/// Credential and access-token errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    AccountInactive,
    MissingToken,
    TokenInvalid,
    TokenExpired,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::AccountInactive => write!(f, "Account is inactive"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
        }
    }
}

impl StdError for AuthError {}

/// Refresh-rotation errors. Each of these clears the rotation cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshError {
    Missing,
    Invalid,
    Revoked,
    Expired,
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshError::Missing => write!(f, "Refresh token missing"),
            RefreshError::Invalid => write!(f, "Invalid refresh token"),
            RefreshError::Revoked => write!(f, "Token has been revoked"),
            RefreshError::Expired => write!(f, "Token expired"),
        }
    }
}

impl StdError for RefreshError {}

/// Persistence-layer errors
#[derive(Debug)]
pub enum StoreError {
    /// Unique-constraint violation: a duplicate email or token digest.
    Duplicate,
    /// A stored record that cannot be interpreted (e.g. malformed hash).
    CorruptRecord(String),
    Connection(String),
    Unexpected(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Duplicate => write!(f, "duplicate key"),
            StoreError::CorruptRecord(msg) => write!(f, "corrupt record: {}", msg),
            StoreError::Connection(msg) => write!(f, "store connection error: {}", msg),
            StoreError::Unexpected(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("duplicate key") || msg.contains("unique constraint") {
            StoreError::Duplicate
        } else if msg.contains("pool") || msg.contains("connect") {
            StoreError::Connection(msg)
        } else {
            StoreError::Unexpected(msg)
        }
    }
}

/// Configuration errors, fatal at startup
#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(what) => write!(f, "missing required config: {}", what),
            ConfigError::Invalid(what, value) => {
                write!(f, "invalid config value for {}: {}", what, value)
            }
        }
    }
}

impl StdError for ConfigError {}

/// Central error type that all service errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    AlreadyRegistered,
    Auth(AuthError),
    Refresh(RefreshError),
    Store(StoreError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::AlreadyRegistered => write!(f, "Email already registered"),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Refresh(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
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

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        AppError::Refresh(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for log correlation
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Stable code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: &str, status: u16) -> Self {
        Self {
            error_id,
            message,
            code: code.to_string(),
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    /// HTTP status and stable machine code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::AlreadyRegistered => (StatusCode::CONFLICT, "ALREADY_REGISTERED"),
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
                }
                AuthError::AccountInactive => (StatusCode::FORBIDDEN, "ACCOUNT_INACTIVE"),
                AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "MISSING_TOKEN"),
                AuthError::TokenInvalid => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
                AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            },
            AppError::Refresh(e) => match e {
                RefreshError::Missing => (StatusCode::UNAUTHORIZED, "REFRESH_MISSING"),
                RefreshError::Invalid => (StatusCode::UNAUTHORIZED, "REFRESH_INVALID"),
                RefreshError::Revoked => (StatusCode::UNAUTHORIZED, "REFRESH_REVOKED"),
                RefreshError::Expired => (StatusCode::UNAUTHORIZED, "REFRESH_EXPIRED"),
            },
            AppError::Store(StoreError::Connection(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message safe to expose to the caller. Store/config/internal details
    /// stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::AlreadyRegistered => self.to_string(),
            AppError::Auth(e) => e.to_string(),
            AppError::Refresh(e) => e.to_string(),
            AppError::Store(StoreError::Connection(_)) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Store(_) => "Storage error occurred".to_string(),
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn log(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::AlreadyRegistered => {
                tracing::warn!(error_id = error_id, "Duplicate registration attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Authentication error");
            }
            AppError::Refresh(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Refresh rotation rejected");
            }
            AppError::Store(e) => {
                tracing::error!(error_id = error_id, error = %e, "Store error");
            }
            AppError::Config(e) => {
                tracing::error!(error_id = error_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let (status, code) = self.status_and_code();
        let body = ErrorResponse::new(error_id, self.public_message(), code, status.as_u16());

        let mut builder = HttpResponse::build(status);
        // Any refresh-flow rejection invalidates the cookie client-side.
        if matches!(self, AppError::Refresh(_)) {
            builder.cookie(removal_cookie());
        }
        builder.json(body)
    }
}
