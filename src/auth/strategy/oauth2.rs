//! OAuth2 client-credentials strategy with serialized token refresh.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::AuthStrategy;
use crate::error::{FrameworkError, Result};

/// Expiry skew: a token is treated as stale this far ahead of its real
/// expiry so a request built just before expiry doesn't get rejected mid-flight.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

struct CachedToken {
    access_token: SecretString,
    expires_at: Instant,
}

impl CachedToken {
    fn is_stale(&self) -> bool {
        Instant::now() + EXPIRY_SKEW >= self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// OAuth2 client-credentials grant. Holds the client id/secret and token
/// endpoint, and maintains a cached bearer token across requests.
///
/// Concurrent callers that observe a missing or stale token all contend on
/// the same [`tokio::sync::Mutex`]; the lock is held across the whole
/// check-then-fetch-then-store sequence (mirroring a thundering-herd guard
/// around a single credential cache), so exactly one token-endpoint POST is
/// in flight at any moment and the rest simply wait and reuse its result.
pub struct OAuth2ClientCredentials {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for OAuth2ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl OAuth2ClientCredentials {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            cached: Mutex::new(None),
        }
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| FrameworkError::auth(format!("token request failed: {e}"), None, None))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FrameworkError::auth(
                format!("token endpoint returned {status}"),
                None,
                Some(crate::error::ResponseDescriptor::new(status.as_u16(), &body)),
            ));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| FrameworkError::auth(format!("token response parse error: {e}"), None, None))?;

        Ok(CachedToken {
            access_token: SecretString::from(parsed.access_token),
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }

    /// Forces the next `apply` to refresh the token regardless of staleness.
    pub async fn invalidate(&self) {
        let mut guard = self.cached.lock().await;
        *guard = None;
    }
}

#[async_trait]
impl AuthStrategy for OAuth2ClientCredentials {
    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let mut guard = self.cached.lock().await;

        let needs_refresh = match guard.as_ref() {
            Some(token) => token.is_stale(),
            None => true,
        };

        if needs_refresh {
            let token = self.fetch_token().await?;
            *guard = Some(token);
        }

        let token = guard.as_ref().expect("token populated above");
        Ok(request.bearer_auth(token.access_token.expose_secret()))
    }

    fn name(&self) -> &'static str {
        "oauth2_client_credentials"
    }
}
