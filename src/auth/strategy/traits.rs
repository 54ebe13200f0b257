//! Authentication strategy contract (§4.2).

use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::error::Result;

/// Stamps credentials onto an outbound request. Strategies are
/// state-bearing and must be safe under concurrent use by the engine — the
/// engine holds one strategy instance for its whole lifetime and calls
/// `apply` once per request attempt, possibly from many concurrent callers.
#[async_trait]
pub trait AuthStrategy: Send + Sync + Debug {
    /// Returns the request with credentials stamped, typically as headers.
    /// May perform I/O (e.g. an OAuth2 token fetch) and may fail with
    /// [`crate::error::FrameworkError::AuthError`] or
    /// [`crate::error::FrameworkError::ConfigError`].
    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder>;

    /// Strategy name, used in error messages and tracing spans.
    fn name(&self) -> &'static str;
}
