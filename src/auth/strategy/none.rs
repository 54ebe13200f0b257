//! No-auth strategy — identity function.

use async_trait::async_trait;
use reqwest::RequestBuilder;

use super::AuthStrategy;
use crate::error::Result;

/// Applies no credentials at all. Used against public, unauthenticated
/// scholarly API endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_auth_is_identity() {
        let client = reqwest::Client::new();
        let request = client.get("https://example.test/works");
        let strategy = NoAuth;
        // Applying should not error and should not panic building the request.
        let applied = strategy.apply(request).await.unwrap();
        let built = applied.build().unwrap();
        assert!(built.headers().get("authorization").is_none());
    }
}
