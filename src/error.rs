//! Error taxonomy surfaced by the request engine and everything built on it.

use std::time::Duration;

use thiserror::Error;

/// Identifies the outbound request an error is attached to.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }
}

/// Bounded information about the response that produced an error, if one was
/// received. `body_snippet` is truncated to the first `BODY_SNIPPET_LIMIT`
/// bytes so large error bodies never blow up a log line.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub body_snippet: String,
}

const BODY_SNIPPET_LIMIT: usize = 1024;

impl ResponseDescriptor {
    pub fn new(status: u16, body: &str) -> Self {
        let body_snippet = if body.len() > BODY_SNIPPET_LIMIT {
            let mut end = BODY_SNIPPET_LIMIT;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}…", &body[..end])
        } else {
            body.to_string()
        };
        Self {
            status,
            body_snippet,
        }
    }
}

/// Root error type for the framework. Sub-kinds are disjoint; callers may
/// match on the specific variant or treat the whole enum uniformly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameworkError {
    /// Invalid or missing settings. Fatal, never retried.
    #[error("configuration error: {message}")]
    ConfigError { message: String },

    /// Credential acquisition/injection failed, or the server rejected
    /// credentials (401/403) after auth was applied.
    #[error("authentication error: {message}")]
    AuthError {
        message: String,
        request: Option<RequestDescriptor>,
        response: Option<ResponseDescriptor>,
    },

    /// Transport-level failure after all retries were exhausted.
    #[error("network error after {attempts} attempt(s): {source}")]
    NetworkError {
        #[source]
        source: reqwest::Error,
        request: Option<RequestDescriptor>,
        attempts: u32,
    },

    /// The overall request exceeded its time budget after retries.
    #[error("request timed out after {attempts} attempt(s)")]
    TimeoutErrorKind {
        request: Option<RequestDescriptor>,
        attempts: u32,
    },

    /// Server returned a non-success status not covered by a narrower kind.
    #[error("api error: {} {}", response.status, response.body_snippet)]
    ApiError {
        request: Option<RequestDescriptor>,
        response: ResponseDescriptor,
        attempts: u32,
    },

    /// Status 404. Subtype of `ApiError`.
    #[error("not found: {}", request.as_ref().map(|r| r.url.as_str()).unwrap_or("<unknown>"))]
    NotFoundError {
        request: Option<RequestDescriptor>,
        response: Option<ResponseDescriptor>,
    },

    /// Status 429 persisting after retries. Subtype of `ApiError`.
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {:.1}s", d.as_secs_f64())).unwrap_or_default())]
    RateLimitError {
        request: Option<RequestDescriptor>,
        response: Option<ResponseDescriptor>,
        retry_after: Option<Duration>,
    },

    /// Request arguments invalid, or the response body could not be parsed
    /// into the expected shape.
    #[error("validation error: {message}")]
    ValidationErrorKind { message: String },

    /// A pre- or post-request hook raised an error. Never retried.
    #[error("hook '{hook}' failed: {message}")]
    HookError { hook: String, message: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FrameworkError>;

/// Coarse-grained category a `FrameworkError` belongs to, for callers that
/// want to branch without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Auth,
    Transient,
    Validation,
    Hook,
}

impl FrameworkError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FrameworkError::ConfigError { .. } => ErrorCategory::Config,
            FrameworkError::AuthError { .. } => ErrorCategory::Auth,
            FrameworkError::NetworkError { .. }
            | FrameworkError::TimeoutErrorKind { .. }
            | FrameworkError::RateLimitError { .. } => ErrorCategory::Transient,
            FrameworkError::ApiError { response, .. } if (500..600).contains(&response.status) => {
                ErrorCategory::Transient
            }
            FrameworkError::ApiError { .. } | FrameworkError::NotFoundError { .. } => {
                ErrorCategory::Validation
            }
            FrameworkError::ValidationErrorKind { .. } => ErrorCategory::Validation,
            FrameworkError::HookError { .. } => ErrorCategory::Hook,
        }
    }

    /// Whether the engine's attempt loop should retry this classification.
    /// Hook and validation failures are never retried; auth failures are
    /// not retried by default (an `AuthStrategy` may still recover before
    /// its next `apply`).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FrameworkError::NetworkError { .. }
                | FrameworkError::TimeoutErrorKind { .. }
                | FrameworkError::RateLimitError { .. }
        ) || matches!(self, FrameworkError::ApiError { response, .. } if matches!(response.status, 408 | 425 | 429) || (500..600).contains(&response.status))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FrameworkError::RateLimitError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FrameworkError::ApiError { response, .. } => Some(response.status),
            FrameworkError::NotFoundError { response, .. } => response.as_ref().map(|r| r.status),
            FrameworkError::RateLimitError { response, .. } => {
                response.as_ref().map(|r| r.status)
            }
            _ => None,
        }
    }

    pub(crate) fn not_found(
        request: Option<RequestDescriptor>,
        response: Option<ResponseDescriptor>,
    ) -> Self {
        FrameworkError::NotFoundError { request, response }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        FrameworkError::ValidationErrorKind {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        FrameworkError::ConfigError {
            message: message.into(),
        }
    }

    pub(crate) fn auth(
        message: impl Into<String>,
        request: Option<RequestDescriptor>,
        response: Option<ResponseDescriptor>,
    ) -> Self {
        FrameworkError::AuthError {
            message: message.into(),
            request,
            response,
        }
    }
}
