//! Static bearer-token strategy.

use async_trait::async_trait;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

use super::AuthStrategy;
use crate::error::{FrameworkError, Result};

/// Sets `Authorization: Bearer <token>` on every request. The token is held
/// as a [`SecretString`] so it never leaks into `Debug` output or logs.
pub struct StaticBearerStrategy {
    token: SecretString,
}

impl std::fmt::Debug for StaticBearerStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticBearerStrategy").finish_non_exhaustive()
    }
}

impl StaticBearerStrategy {
    /// Construct with an explicit token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }

    /// Construct by reading a token from the caller-provided environment
    /// variable; `ConfigError` if the variable is unset.
    pub fn from_env(var: &str) -> Result<Self> {
        let token = std::env::var(var).map_err(|_| {
            FrameworkError::config(format!(
                "static bearer token: environment variable '{var}' is not set"
            ))
        })?;
        Ok(Self::new(token))
    }
}

#[async_trait]
impl AuthStrategy for StaticBearerStrategy {
    async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(self.token.expose_secret()))
    }

    fn name(&self) -> &'static str {
        "static_bearer"
    }
}
