//! Tunable knobs the engine consumes (Setting bundle, §3/§4.6).

use std::time::Duration;

use crate::error::{FrameworkError, Result};
use crate::hooks::{PostResponseHook, PreRequestHook};

/// The full set of tunables a [`crate::engine::RequestEngine`] is built with.
///
/// Constructed via [`EngineSettingsBuilder`], which validates the combination
/// and rejects anything nonsensical with [`FrameworkError::ConfigError`].
#[derive(Clone)]
pub struct EngineSettings {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub user_agent: String,
    pub rate_limit_enabled: bool,
    pub rate_limit_buffer: f64,
    pub default_retry_after_on_429: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub(crate) pre_request_hooks: Vec<std::sync::Arc<dyn PreRequestHook>>,
    pub(crate) post_response_hooks: Vec<std::sync::Arc<dyn PostResponseHook>>,
}

impl EngineSettings {
    pub fn builder() -> EngineSettingsBuilder {
        EngineSettingsBuilder::default()
    }
}

/// Builder for [`EngineSettings`]. Named presets mirror common deployment
/// postures; `build()` is the single validation choke point.
pub struct EngineSettingsBuilder {
    request_timeout: Duration,
    max_retries: u32,
    backoff_factor: f64,
    user_agent: String,
    rate_limit_enabled: bool,
    rate_limit_buffer: f64,
    default_retry_after_on_429: Duration,
    cache_enabled: bool,
    cache_ttl: Duration,
    cache_capacity: usize,
    pre_request_hooks: Vec<std::sync::Arc<dyn PreRequestHook>>,
    post_response_hooks: Vec<std::sync::Arc<dyn PostResponseHook>>,
}

impl Default for EngineSettingsBuilder {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_factor: 0.5,
            user_agent: concat!("citegraph-core/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit_enabled: true,
            rate_limit_buffer: 0.1,
            default_retry_after_on_429: Duration::from_secs(30),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 256,
            pre_request_hooks: Vec::new(),
            post_response_hooks: Vec::new(),
        }
    }
}

impl EngineSettingsBuilder {
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.rate_limit_enabled = enabled;
        self
    }

    pub fn rate_limit_buffer(mut self, buffer: f64) -> Self {
        self.rate_limit_buffer = buffer;
        self
    }

    pub fn default_retry_after_on_429(mut self, duration: Duration) -> Self {
        self.default_retry_after_on_429 = duration;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn pre_request_hook(mut self, hook: impl PreRequestHook + 'static) -> Self {
        self.pre_request_hooks.push(std::sync::Arc::new(hook));
        self
    }

    pub fn post_response_hook(mut self, hook: impl PostResponseHook + 'static) -> Self {
        self.post_response_hooks.push(std::sync::Arc::new(hook));
        self
    }

    /// No retries, no circuit for slow backends to hide behind — useful for
    /// tests and for clients that want to own retry policy themselves.
    pub fn no_retry(mut self) -> Self {
        self.max_retries = 0;
        self
    }

    pub fn aggressive(mut self) -> Self {
        self.max_retries = 5;
        self.backoff_factor = 0.2;
        self
    }

    pub fn conservative(mut self) -> Self {
        self.max_retries = 2;
        self.backoff_factor = 1.0;
        self
    }

    pub fn build(self) -> Result<EngineSettings> {
        if self.request_timeout.is_zero() {
            return Err(FrameworkError::config(
                "request_timeout must be a positive duration",
            ));
        }
        if self.backoff_factor <= 0.0 {
            return Err(FrameworkError::config(
                "backoff_factor must be a positive real number",
            ));
        }
        if !(0.0..=1.0).contains(&self.rate_limit_buffer) {
            return Err(FrameworkError::config(
                "rate_limit_buffer must be a fraction in [0, 1]",
            ));
        }
        if self.default_retry_after_on_429.is_zero() {
            return Err(FrameworkError::config(
                "default_retry_after_on_429 must be a positive duration",
            ));
        }
        if self.cache_enabled && self.cache_ttl.is_zero() {
            return Err(FrameworkError::config(
                "cache_ttl must be a positive duration when caching is enabled",
            ));
        }
        if self.cache_enabled && self.cache_capacity == 0 {
            return Err(FrameworkError::config(
                "cache_capacity must be positive when caching is enabled",
            ));
        }

        Ok(EngineSettings {
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
            user_agent: self.user_agent,
            rate_limit_enabled: self.rate_limit_enabled,
            rate_limit_buffer: self.rate_limit_buffer,
            default_retry_after_on_429: self.default_retry_after_on_429,
            cache_enabled: self.cache_enabled,
            cache_ttl: self.cache_ttl,
            cache_capacity: self.cache_capacity,
            pre_request_hooks: self.pre_request_hooks,
            post_response_hooks: self.post_response_hooks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_build() {
        let settings = EngineSettings::builder().build().unwrap();
        assert_eq!(settings.max_retries, 3);
        assert!(settings.cache_enabled);
    }

    #[test]
    fn test_no_retry_preset() {
        let settings = EngineSettings::builder().no_retry().build().unwrap();
        assert_eq!(settings.max_retries, 0);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = EngineSettings::builder()
            .request_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, FrameworkError::ConfigError { .. }));
    }

    #[test]
    fn test_rejects_out_of_range_buffer() {
        let err = EngineSettings::builder()
            .rate_limit_buffer(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(err, FrameworkError::ConfigError { .. }));
    }

    #[test]
    fn test_rejects_zero_cache_capacity_when_enabled() {
        let err = EngineSettings::builder()
            .cache_enabled(true)
            .cache_capacity(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, FrameworkError::ConfigError { .. }));
    }
}
