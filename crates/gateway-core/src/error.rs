//! Error types and handling for the gateway.
//!
//! This module provides the error hierarchy shared by every crate in the
//! workspace. Each variant maps to an HTTP status code and a stable error code
//! so the front door can render it without knowing the internals.

use crate::types::ValidationError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type covering all error scenarios
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Field that failed validation (if applicable)
        field: Option<String>,
        /// Error code for programmatic handling
        code: String,
    },

    /// Admission denied by the rate limiter
    #[error("Rate limit exceeded")]
    RateLimit {
        /// Duration to wait before retrying
        retry_after: Option<Duration>,
        /// Rate limit that was exceeded
        limit: Option<u32>,
    },

    /// Admission denied by the circuit breaker
    #[error("Circuit breaker open for upstream: {upstream}")]
    CircuitBreakerOpen {
        /// Upstream guarded by the open breaker
        upstream: String,
    },

    /// A single upstream attempt failed
    #[error("Provider error: {provider} - {message}")]
    Provider {
        /// Provider that returned the error
        provider: String,
        /// Error message
        message: String,
        /// HTTP status code from provider (if applicable)
        status_code: Option<u16>,
        /// Whether the failure is transient (connectivity or timeout)
        retryable: bool,
    },

    /// The upstream call failed for good (non-transient or retries exhausted)
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Upstream {
        /// Gateway operation that failed
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// The failure of the last attempt
        #[source]
        source: Box<GatewayError>,
    },

    /// Streaming error
    #[error("Streaming error: {message}")]
    Streaming {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitBreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            // Upstream status codes describe the upstream's view, not ours
            Self::Provider { retryable, .. } => {
                if *retryable {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            Self::Upstream { source, .. } => match source.as_ref() {
                Self::Provider {
                    retryable: true, ..
                } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Streaming { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this error is a transient upstream failure worth retrying
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                retryable: true,
                ..
            }
        )
    }

    /// Check if this error was raised before any upstream attempt
    #[must_use]
    pub fn is_admission_failure(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::RateLimit { .. } | Self::CircuitBreakerOpen { .. }
        )
    }

    /// Get the error type string for API responses
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid_request_error",
            Self::RateLimit { .. } => "rate_limit_error",
            Self::CircuitBreakerOpen { .. } => "service_unavailable_error",
            Self::Provider { .. } | Self::Upstream { .. } => "upstream_error",
            Self::Streaming { .. } => "streaming_error",
            Self::Configuration { .. } | Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the error code for programmatic handling
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::Validation { code, .. } => code,
            Self::RateLimit { .. } => "rate_limit_exceeded",
            Self::CircuitBreakerOpen { .. } => "circuit_breaker_open",
            Self::Provider {
                retryable: true, ..
            } => "upstream_transient",
            Self::Provider { .. } => "upstream_error",
            Self::Upstream { .. } => "upstream_service_error",
            Self::Streaming { .. } => "streaming_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create a rate limit error
    #[must_use]
    pub fn rate_limit(retry_after: Option<Duration>, limit: Option<u32>) -> Self {
        Self::RateLimit { retry_after, limit }
    }

    /// Create a circuit breaker open error
    #[must_use]
    pub fn circuit_breaker_open(upstream: impl Into<String>) -> Self {
        Self::CircuitBreakerOpen {
            upstream: upstream.into(),
        }
    }

    /// Create a provider error
    #[must_use]
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Wrap the terminal failure of an upstream call
    #[must_use]
    pub fn upstream(operation: impl Into<String>, attempts: u32, source: GatewayError) -> Self {
        Self::Upstream {
            operation: operation.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// Create a streaming error
    #[must_use]
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        let (field, code) = match &err {
            ValidationError::EmptyQuery => ("query", "empty_query"),
            ValidationError::QueryTooLong { .. } => ("query", "query_too_long"),
            ValidationError::InvalidMaxResults { .. } => ("max_results", "invalid_max_results"),
            ValidationError::TooManyDomains { field, .. } => (*field, "too_many_domains"),
            ValidationError::InvalidUrlCount { .. } => ("urls", "invalid_url_count"),
            ValidationError::InvalidUrl { .. } => ("urls", "invalid_url"),
            ValidationError::InvalidMaxTokens { .. } => ("max_tokens", "invalid_max_tokens"),
            ValidationError::UnknownModel { .. } => ("model", "unknown_model"),
            ValidationError::UnknownSearchDepth { .. } => ("search_depth", "unknown_search_depth"),
        };
        Self::Validation {
            message: err.to_string(),
            field: Some(field.to_string()),
            code: code.to_string(),
        }
    }
}

/// API error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details
    pub error: ApiError,
}

/// API error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Parameter that caused the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Seconds to wait before retrying (rate limit only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&GatewayError> for ApiErrorResponse {
    fn from(err: &GatewayError) -> Self {
        let param = match err {
            GatewayError::Validation { field, .. } => field.clone(),
            _ => None,
        };
        let retry_after_secs = match err {
            GatewayError::RateLimit {
                retry_after: Some(wait),
                ..
            } => Some(wait.as_secs().max(1)),
            _ => None,
        };

        Self {
            error: ApiError {
                error_type: err.error_type().to_string(),
                message: err.to_string(),
                code: Some(err.error_code().to_string()),
                param,
                retry_after_secs,
            },
        }
    }
}

impl fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error.message)
    }
}
