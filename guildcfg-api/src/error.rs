//! Error Types for the guildcfg API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum for categorizing errors, each with a fixed status code
//! - ApiError struct for structured error responses
//! - the mapping from engine errors to HTTP responses
//!
//! All errors are serialized as JSON and carry `Cache-Control: no-store`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use guildcfg_core::{CacheError, ConfigError, GuildCfgError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// No acting user was attached to the request
    Unauthorized,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Tenant is unknown or not active
    TenantNotFound,

    // ========================================================================
    // Precondition Errors (409, 412)
    // ========================================================================
    /// `If-Match` header missing or malformed
    PreconditionFailed,

    /// Expected version does not match the stored version
    VersionConflict,

    // ========================================================================
    // Rate Limiting (429)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Durable transaction could not commit
    DatabaseError,

    /// A backing store is temporarily unreachable
    ServiceUnavailable,

    /// The write committed but the cache could not be updated
    CachePropagationFailed,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            ErrorCode::TenantNotFound => StatusCode::NOT_FOUND,

            ErrorCode::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            ErrorCode::VersionConflict => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::ServiceUnavailable | ErrorCode::CachePropagationFailed => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::TenantNotFound => "Guild not found",
            ErrorCode::PreconditionFailed => "If-Match header with the current version is required",
            ErrorCode::VersionConflict => "Configuration was modified by another request",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::CachePropagationFailed => {
                "Configuration saved but the cache could not be updated"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (current version, saved version, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Sent as `Retry-After`; not part of the body.
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn tenant_not_found(tenant_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TenantNotFound,
            format!("Guild {} not found", tenant_id),
        )
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PreconditionFailed, message)
    }

    /// 409 carrying the version the caller must re-fetch.
    pub fn version_conflict(current_version: i64) -> Self {
        Self::from_code(ErrorCode::VersionConflict)
            .with_details(serde_json::json!({ "currentVersion": current_version }))
    }

    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        let mut err = Self::new(
            ErrorCode::TooManyRequests,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        );
        err.retry_after_secs = Some(retry_after_secs);
        err
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// 503 telling the caller the write did take effect at `saved_version`.
    pub fn cache_propagation_failed(tenant_id: &str, saved_version: i64) -> Self {
        Self::from_code(ErrorCode::CachePropagationFailed).with_details(serde_json::json!({
            "savedVersion": saved_version,
            "tenantId": tenant_id,
        }))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self)).into_response();

        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if let Some(secs) = retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

// ============================================================================
// CONVERSIONS FROM ENGINE ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::WhitelistTooLarge { submitted, limit } => {
                ApiError::validation_failed(err.to_string()).with_details(serde_json::json!({
                    "field": "whitelistedChannelIds",
                    "submitted": submitted,
                    "limit": limit,
                }))
            }
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. } => {
                let field = field.clone();
                ApiError::validation_failed(err.to_string())
                    .with_details(serde_json::json!({ "field": field }))
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { tenant_id } => ApiError::tenant_not_found(tenant_id),
            StorageError::VersionConflict {
                current_version, ..
            } => ApiError::version_conflict(current_version),
            StorageError::TransactionFailed { reason } => {
                tracing::error!(reason = %reason, "Durable transaction failed");
                ApiError::database_error("Database operation failed")
            }
            StorageError::Unavailable { reason } => {
                tracing::error!(reason = %reason, "Durable store unavailable");
                ApiError::service_unavailable("Database temporarily unavailable")
            }
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!(error = %err, "Cache error");
        ApiError::service_unavailable("Cache temporarily unavailable")
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

impl From<GuildCfgError> for ApiError {
    fn from(err: GuildCfgError) -> Self {
        match err {
            GuildCfgError::Validation(e) => e.into(),
            GuildCfgError::Storage(e) => e.into(),
            GuildCfgError::Cache(e) => e.into(),
            GuildCfgError::Config(e) => e.into(),
            GuildCfgError::TenantNotActive { tenant_id } => ApiError::tenant_not_found(tenant_id),
            GuildCfgError::RateLimited {
                retry_after_secs, ..
            } => ApiError::too_many_requests(retry_after_secs),
            GuildCfgError::CachePropagation {
                tenant_id,
                committed_version,
                ..
            } => ApiError::cache_propagation_failed(&tenant_id, committed_version),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

pub type ApiResult<T> = Result<T, ApiError>;
