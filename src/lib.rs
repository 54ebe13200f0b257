//! # citegraph-core
//!
//! A resilient async request engine and pluggable abstractions for building
//! clients against paginated, JSON-over-HTTP scholarly APIs.
//!
//! The hard, reusable core is [`engine::RequestEngine`]: it owns retries with
//! backoff, client-side caching, rate-limit awareness, authentication
//! injection, and a uniform error taxonomy. A concrete client describes only
//! the API's unique shape — its base URL, its response envelope
//! ([`envelope::Envelope`]), its authentication ([`auth::AuthStrategy`]), and
//! its resources ([`resource::ResourceBinding`]) — and gets every
//! cross-cutting concern for free.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::Value;
//! use citegraph_core::auth::NoAuth;
//! use citegraph_core::engine::{RequestEngine, RequestSpec};
//! use citegraph_core::envelope::Envelope;
//! use citegraph_core::settings::EngineSettings;
//!
//! struct WorksEnvelope;
//!
//! impl Envelope for WorksEnvelope {
//!     fn results(&self, doc: &Value) -> Vec<Value> {
//!         doc.get("results").and_then(|v| v.as_array()).cloned().unwrap_or_default()
//!     }
//!     fn next_cursor(&self, doc: &Value) -> Option<String> {
//!         doc.get("next_cursor").and_then(|v| v.as_str()).map(str::to_string)
//!     }
//!     fn total(&self, doc: &Value) -> Option<u64> {
//!         doc.get("total").and_then(|v| v.as_u64())
//!     }
//! }
//!
//! # async fn run() -> citegraph_core::error::Result<()> {
//! let settings = EngineSettings::builder().build()?;
//! let engine = RequestEngine::new(
//!     "https://api.example.org/",
//!     settings,
//!     Arc::new(WorksEnvelope),
//!     Arc::new(NoAuth),
//! )?;
//! let doc = engine.request(RequestSpec::get("works")).await?;
//! println!("{doc}");
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod cache;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod hooks;
pub mod rate_limit;
pub mod resource;
pub mod settings;

pub use engine::{RequestEngine, RequestSpec};
pub use envelope::Envelope;
pub use error::{ErrorCategory, FrameworkError, Result};
pub use hooks::{InboundResponse, OutboundRequest, PostResponseHook, PreRequestHook};
pub use resource::{Filters, Flattenable, ResourceBinding, SearchResponse};
pub use settings::{EngineSettings, EngineSettingsBuilder};
