//! End-to-end scenarios against a local mock HTTP server (§8).

use std::sync::Arc;
use std::time::{Duration, Instant};

use citegraph_core::auth::{NoAuth, OAuth2ClientCredentials};
use citegraph_core::engine::{RequestEngine, RequestSpec};
use citegraph_core::envelope::Envelope;
use citegraph_core::resource::ResourceBinding;
use citegraph_core::settings::EngineSettings;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct WorksEnvelope;

impl Envelope for WorksEnvelope {
    fn results(&self, doc: &Value) -> Vec<Value> {
        doc.get("results").and_then(|v| v.as_array()).cloned().unwrap_or_default()
    }

    fn next_cursor(&self, doc: &Value) -> Option<String> {
        doc.get("next").and_then(|v| v.as_str()).map(str::to_string)
    }

    fn total(&self, doc: &Value) -> Option<u64> {
        doc.get("total").and_then(|v| v.as_u64())
    }
}

#[derive(Debug, Deserialize)]
struct Work {
    id: String,
}

#[tokio::test]
async fn scenario_cache_hit_avoids_second_http_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("id", "X"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"results": [{"id": "X"}], "next": null, "total": 1}),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = EngineSettings::builder()
        .cache_ttl(Duration::from_secs(60))
        .cache_capacity(8)
        .build()
        .unwrap();
    let engine = RequestEngine::new(&server.uri(), settings, Arc::new(WorksEnvelope), Arc::new(NoAuth)).unwrap();

    let first = engine
        .request(RequestSpec::get("works").query("id", "X"))
        .await
        .unwrap();
    let second = engine
        .request(RequestSpec::get("works").query("id", "X"))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn scenario_backoff_on_5xx_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "next": null})))
        .mount(&server)
        .await;

    let settings = EngineSettings::builder()
        .max_retries(2)
        .backoff_factor(0.1)
        .build()
        .unwrap();
    let engine = RequestEngine::new(&server.uri(), settings, Arc::new(WorksEnvelope), Arc::new(NoAuth)).unwrap();

    let started = Instant::now();
    let result = engine.request(RequestSpec::get("works")).await;
    assert!(result.is_ok());
    // Two backoff sleeps of ~0.1s and ~0.2s with jitter; generously bounded.
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn scenario_429_honors_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "next": null})))
        .mount(&server)
        .await;

    let settings = EngineSettings::builder()
        .max_retries(1)
        .default_retry_after_on_429(Duration::from_secs(30))
        .build()
        .unwrap();
    let engine = RequestEngine::new(&server.uri(), settings, Arc::new(WorksEnvelope), Arc::new(NoAuth)).unwrap();

    let started = Instant::now();
    let result = engine.request(RequestSpec::get("works")).await;
    assert!(result.is_ok());
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn scenario_cursor_iteration_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("cursor", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"results": [{"id": "1"}, {"id": "2"}], "next": "A"}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("cursor", "A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{"id": "3"}], "next": "B"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("cursor", "B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"results": [{"id": "4"}, {"id": "5"}], "next": null}),
        ))
        .mount(&server)
        .await;

    let settings = EngineSettings::builder().build().unwrap();
    let engine = Arc::new(
        RequestEngine::new(&server.uri(), settings, Arc::new(WorksEnvelope), Arc::new(NoAuth)).unwrap(),
    );
    let binding = ResourceBinding::new(engine, "works");

    let stream = binding.iterate::<Work>(2, None, None).unwrap();
    let items: Vec<Work> = stream.map(|r| r.unwrap()).collect().await;
    let ids: Vec<String> = items.into_iter().map(|w| w.id).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn scenario_get_by_id_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "next": null, "total": 0})))
        .mount(&server)
        .await;

    let settings = EngineSettings::builder().build().unwrap();
    let engine = Arc::new(
        RequestEngine::new(&server.uri(), settings, Arc::new(WorksEnvelope), Arc::new(NoAuth)).unwrap(),
    );
    let binding = ResourceBinding::new(engine, "works");

    let err = binding.get::<Work>("missing", None).await.unwrap_err();
    assert!(matches!(err, citegraph_core::FrameworkError::NotFoundError { .. }));
}

#[tokio::test]
async fn scenario_oauth2_refresh_under_concurrency_then_authenticated_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "shared-token",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(header("authorization", "Bearer shared-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [], "next": null})))
        .mount(&server)
        .await;

    let auth = Arc::new(OAuth2ClientCredentials::new(
        reqwest::Client::new(),
        format!("{}/token", server.uri()),
        "client-id",
        "client-secret",
    ));
    let settings = EngineSettings::builder().build().unwrap();
    let engine = Arc::new(RequestEngine::new(&server.uri(), settings, Arc::new(WorksEnvelope), auth).unwrap());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.request(RequestSpec::get("works")).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}
