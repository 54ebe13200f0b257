//! Pre-request and post-response hook contracts (§4.6 step 4b/4d).

use std::fmt::Debug;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::Result;

/// Mutable view of an outbound request handed to pre-request hooks. Header
/// mutation is explicitly supported; URL/query mutation is intentionally not
/// exposed here (Open Question, see DESIGN.md) so the cache key computed
/// before hook dispatch always matches what is actually sent.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
}

/// The response observed after dispatch, handed to post-response hooks
/// alongside the parsed document (if any) or the error that resulted.
#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

/// Runs just before a request is dispatched. Hooks run in list order; a
/// raised error aborts the attempt with [`crate::error::FrameworkError::HookError`]
/// and is never retried.
#[async_trait]
pub trait PreRequestHook: Send + Sync + Debug {
    async fn call(&self, request: &mut OutboundRequest) -> Result<()>;

    /// Name used to identify this hook in error messages.
    fn name(&self) -> &str;
}

/// Runs just after a response is received (or an error classified). Hooks
/// run in list order; a raised error aborts the retry sequence.
#[async_trait]
pub trait PostResponseHook: Send + Sync + Debug {
    async fn call(&self, response: &InboundResponse) -> Result<()>;

    fn name(&self) -> &str;
}
