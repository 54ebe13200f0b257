//! The request engine (§4.6): orchestrates auth, cache, rate-gate, execute,
//! retry, and hook dispatch for a single logical API binding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::auth::AuthStrategy;
use crate::cache::{CacheKey, ResponseCache};
use crate::envelope::Envelope;
use crate::error::{FrameworkError, RequestDescriptor, ResponseDescriptor, Result};
use crate::hooks::{InboundResponse, OutboundRequest};
use crate::rate_limit::RateLimitTracker;
use crate::settings::EngineSettings;

/// Describes a single logical call. Built directly or, more commonly, by the
/// resource mixins in [`crate::resource`].
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub expects_json: bool,
    pub cache_allowed: bool,
    /// Per-call override of `settings.max_retries` — the extension point
    /// §4.6 mentions for clients that want to suppress retries for a
    /// specific call (e.g. `max_retries = Some(0)`).
    pub max_retries_override: Option<u32>,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
            expects_json: true,
            cache_allowed: true,
            max_retries_override: None,
        }
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn extend_query(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn cache_allowed(mut self, allowed: bool) -> Self {
        self.cache_allowed = allowed;
        self
    }

    pub fn max_retries_override(mut self, max_retries: u32) -> Self {
        self.max_retries_override = Some(max_retries);
        self
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// Orchestrates a single logical API binding: one HTTP transport, one cache,
/// one rate-limit tracker, one auth strategy, one envelope. Construct once
/// per API; call [`RequestEngine::release`] to tear it down explicitly.
pub struct RequestEngine {
    base_url: Url,
    http: reqwest::Client,
    settings: EngineSettings,
    auth: Arc<dyn AuthStrategy>,
    envelope: Arc<dyn Envelope>,
    cache: ResponseCache,
    rate_limiter: RateLimitTracker,
    released: AtomicBool,
}

impl RequestEngine {
    pub fn new(
        base_url: &str,
        settings: EngineSettings,
        envelope: Arc<dyn Envelope>,
        auth: Arc<dyn AuthStrategy>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FrameworkError::config(format!("invalid base_url: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FrameworkError::config(format!("failed to build http client: {e}")))?;

        let cache = ResponseCache::new(settings.cache_capacity.max(1), settings.cache_ttl);

        Ok(Self {
            base_url,
            http,
            settings,
            auth,
            envelope,
            cache,
            rate_limiter: RateLimitTracker::new(),
            released: AtomicBool::new(false),
        })
    }

    pub fn envelope(&self) -> &Arc<dyn Envelope> {
        &self.envelope
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Closes the transport and drops cached entries. Further calls surface
    /// `ConfigError`.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.cache.clear();
    }

    fn check_released(&self) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(FrameworkError::config(
                "engine has been released; construct a new engine to continue",
            ));
        }
        Ok(())
    }

    fn resolve_url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| FrameworkError::validation(format!("invalid path '{path}': {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Executes `spec` end to end: cache lookup, rate gate, the bounded
    /// attempt loop with auth/hooks/retries, and cache population on
    /// success. Returns the parsed JSON document.
    pub async fn request(&self, spec: RequestSpec) -> Result<Value> {
        self.check_released()?;

        let url = self.resolve_url(&spec.path, &spec.query)?;
        let url_without_query = {
            let mut u = url.clone();
            u.set_query(None);
            u.to_string()
        };

        let idempotent = is_idempotent(&spec.method);
        let body_fingerprint = spec.body.as_ref().and_then(|b| serde_json::to_string(b).ok());
        let cache_key = CacheKey::new(
            spec.method.as_str(),
            &url_without_query,
            &spec.query,
            body_fingerprint.as_deref(),
        );

        if idempotent && spec.cache_allowed && self.settings.cache_enabled {
            if let Some((body, _status)) = self.cache.get(&cache_key) {
                tracing::debug!(url = %url, "cache hit");
                return Ok(body);
            }
        }

        self.rate_limiter.wait_if_paused().await;

        let max_retries = spec.max_retries_override.unwrap_or(self.settings.max_retries);
        let mut attempt: u32 = 0;

        loop {
            let request_descriptor = RequestDescriptor::new(spec.method.as_str(), url.as_str());

            let builder = self.http.request(spec.method.clone(), url.clone());
            let builder = if let Some(ref body) = spec.body {
                builder.json(body)
            } else {
                builder
            };
            let builder = builder.header("accept", "application/json");

            let builder = match self.auth.apply(builder).await {
                Ok(b) => b,
                Err(e) => return Err(e),
            };

            let mut req = builder.build().map_err(|e| {
                FrameworkError::NetworkError {
                    source: e,
                    request: Some(request_descriptor.clone()),
                    attempts: attempt + 1,
                }
            })?;

            let mut outbound = OutboundRequest {
                method: req.method().to_string(),
                url: req.url().to_string(),
                headers: req.headers().clone(),
            };
            for hook in &self.settings.pre_request_hooks {
                hook.call(&mut outbound).await.map_err(|e| FrameworkError::HookError {
                    hook: hook.name().to_string(),
                    message: e.to_string(),
                })?;
            }
            *req.headers_mut() = outbound.headers;

            attempt += 1;
            let classification = self
                .execute_one_attempt(req, &request_descriptor, attempt, &spec, &cache_key)
                .await;

            match classification {
                Attempt::Success(value) => return Ok(value),
                Attempt::Terminal(err) => return Err(err),
                Attempt::Retryable(err) => {
                    if attempt > max_retries {
                        return Err(err);
                    }
                    self.await_retry_delay(attempt, &err).await;
                    continue;
                }
            }
        }
    }

    async fn await_retry_delay(&self, attempt: u32, err: &FrameworkError) {
        if matches!(err, FrameworkError::RateLimitError { .. }) {
            self.rate_limiter.wait_if_paused().await;
            return;
        }
        let base = self.settings.backoff_factor * 2f64.powi(attempt as i32 - 1);
        let jitter_frac = rand::rng().random_range(-0.25..=0.25);
        let delay_secs = (base * (1.0 + jitter_frac)).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(delay_secs)).await;
    }

    async fn execute_one_attempt(
        &self,
        request: reqwest::Request,
        request_descriptor: &RequestDescriptor,
        attempt: u32,
        spec: &RequestSpec,
        cache_key: &CacheKey,
    ) -> Attempt {
        let outcome = tokio::time::timeout(self.settings.request_timeout, self.http.execute(request)).await;

        let response = match outcome {
            Err(_elapsed) => {
                let err = FrameworkError::TimeoutErrorKind {
                    request: Some(request_descriptor.clone()),
                    attempts: attempt,
                };
                return Attempt::Retryable(err);
            }
            Ok(Err(source)) => {
                let err = FrameworkError::NetworkError {
                    source,
                    request: Some(request_descriptor.clone()),
                    attempts: attempt,
                };
                return Attempt::Retryable(err);
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body_text = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = if body_text.trim().is_empty() {
            Some(Value::Object(Default::default()))
        } else {
            serde_json::from_str(&body_text).ok()
        };

        let inbound = InboundResponse {
            status: status.as_u16(),
            headers: headers.clone(),
            body: parsed.clone(),
        };
        for hook in &self.settings.post_response_hooks {
            if let Err(e) = hook.call(&inbound).await {
                return Attempt::Terminal(FrameworkError::HookError {
                    hook: hook.name().to_string(),
                    message: e.to_string(),
                });
            }
        }

        self.rate_limiter.observe(
            &headers,
            status.as_u16(),
            self.settings.rate_limit_enabled,
            self.settings.rate_limit_buffer,
            self.settings.default_retry_after_on_429,
        );

        let response_descriptor = ResponseDescriptor::new(status.as_u16(), &body_text);

        if status.is_success() {
            let value = match parsed {
                Some(v) if !spec.expects_json || body_text.trim().is_empty() => v,
                Some(v) => v,
                None => {
                    return Attempt::Terminal(FrameworkError::validation(format!(
                        "could not parse response body as JSON: {}",
                        response_descriptor.body_snippet
                    )));
                }
            };

            if is_idempotent(&spec.method) && spec.cache_allowed && self.settings.cache_enabled {
                self.cache.put(cache_key.clone(), value.clone(), status.as_u16());
            }

            return Attempt::Success(value);
        }

        let status_u16 = status.as_u16();
        match status_u16 {
            401 | 403 => Attempt::Terminal(FrameworkError::auth(
                format!("server rejected credentials with status {status_u16}"),
                Some(request_descriptor.clone()),
                Some(response_descriptor),
            )),
            404 => Attempt::Terminal(FrameworkError::not_found(
                Some(request_descriptor.clone()),
                Some(response_descriptor),
            )),
            429 => Attempt::Retryable(FrameworkError::RateLimitError {
                request: Some(request_descriptor.clone()),
                response: Some(response_descriptor),
                retry_after: self
                    .rate_limiter
                    .pause_until()
                    .map(|t| t.saturating_duration_since(std::time::Instant::now())),
            }),
            408 | 425 => Attempt::Retryable(FrameworkError::ApiError {
                request: Some(request_descriptor.clone()),
                response: response_descriptor,
                attempts: attempt,
            }),
            500..=599 => Attempt::Retryable(FrameworkError::ApiError {
                request: Some(request_descriptor.clone()),
                response: response_descriptor,
                attempts: attempt,
            }),
            _ => Attempt::Terminal(FrameworkError::ApiError {
                request: Some(request_descriptor.clone()),
                response: response_descriptor,
                attempts: attempt,
            }),
        }
    }
}

/// Result of classifying a single attempt (§4.6 state machine: `classified`
/// transitions to exactly one of these).
enum Attempt {
    Success(Value),
    /// Not retried — surfaced to the caller immediately.
    Terminal(FrameworkError),
    /// Retried if attempts remain; surfaced otherwise.
    Retryable(FrameworkError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuth;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct TestEnvelope;

    impl Envelope for TestEnvelope {
        fn results(&self, doc: &Value) -> Vec<Value> {
            doc.get("results")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
        }

        fn next_cursor(&self, doc: &Value) -> Option<String> {
            doc.get("next").and_then(|v| v.as_str()).map(|s| s.to_string())
        }

        fn total(&self, doc: &Value) -> Option<u64> {
            doc.get("total").and_then(|v| v.as_u64())
        }
    }

    async fn engine_against(server: &MockServer, settings: EngineSettings) -> RequestEngine {
        RequestEngine::new(
            &server.uri(),
            settings,
            Arc::new(TestEnvelope),
            Arc::new(NoAuth),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_second_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [{"id": "X"}], "next": null, "total": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let settings = EngineSettings::builder().cache_ttl(Duration::from_secs(60)).build().unwrap();
        let engine = engine_against(&server, settings).await;

        let first = engine.request(RequestSpec::get("/works")).await.unwrap();
        let second = engine.request(RequestSpec::get("/works")).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cache_disabled_hits_server_every_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(2)
            .mount(&server)
            .await;

        let settings = EngineSettings::builder().cache_enabled(false).build().unwrap();
        let engine = engine_against(&server, settings).await;

        engine.request(RequestSpec::get("/works")).await.unwrap();
        engine.request(RequestSpec::get("/works")).await.unwrap();
    }

    #[tokio::test]
    async fn test_backoff_retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let settings = EngineSettings::builder()
            .max_retries(2)
            .backoff_factor(0.01)
            .build()
            .unwrap();
        let engine = engine_against(&server, settings).await;

        let result = engine.request(RequestSpec::get("/works")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_max_retries_zero_surfaces_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let settings = EngineSettings::builder().no_retry().build().unwrap();
        let engine = engine_against(&server, settings).await;

        let err = engine.request(RequestSpec::get("/works")).await.unwrap_err();
        assert!(matches!(err, FrameworkError::ApiError { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_404_is_not_found_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let settings = EngineSettings::builder().max_retries(3).build().unwrap();
        let engine = engine_against(&server, settings).await;

        let err = engine.request(RequestSpec::get("/works")).await.unwrap_err();
        assert!(matches!(err, FrameworkError::NotFoundError { .. }));
    }

    #[tokio::test]
    async fn test_non_success_response_never_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let settings = EngineSettings::builder().no_retry().build().unwrap();
        let engine = engine_against(&server, settings).await;

        let _ = engine.request(RequestSpec::get("/works")).await;
        assert!(engine.cache.is_empty());
    }

    #[tokio::test]
    async fn test_release_clears_cache_and_blocks_further_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let settings = EngineSettings::builder().build().unwrap();
        let engine = engine_against(&server, settings).await;
        engine.request(RequestSpec::get("/works")).await.unwrap();
        assert!(!engine.cache.is_empty());

        engine.release();
        assert!(engine.cache.is_empty());

        let err = engine.request(RequestSpec::get("/works")).await.unwrap_err();
        assert!(matches!(err, FrameworkError::ConfigError { .. }));
    }
}
