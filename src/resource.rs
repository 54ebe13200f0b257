//! Resource operation mixins (§4.7): get-by-id, paged search, cursor
//! iteration, layered on top of a [`RequestEngine`] and an [`Envelope`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::engine::{RequestEngine, RequestSpec};
use crate::envelope::INITIAL_CURSOR;
use crate::error::{FrameworkError, Result};

/// A value that can be flattened into name/value pairs for use as filters.
/// Null-valued fields are elided by the mixin, not by implementors.
pub trait Flattenable {
    fn fields(&self) -> Vec<(String, Value)>;
}

/// Duck-typed filter input (§9 Design Notes): either a structured value with
/// a known shape, or a raw name→value map for ad hoc filtering.
pub enum Filters {
    Structured(Box<dyn Flattenable + Send + Sync>),
    Raw(HashMap<String, Value>),
}

impl Filters {
    pub fn structured(value: impl Flattenable + Send + Sync + 'static) -> Self {
        Filters::Structured(Box::new(value))
    }

    pub fn raw(map: HashMap<String, Value>) -> Self {
        Filters::Raw(map)
    }

    fn into_query_pairs(self) -> Vec<(String, String)> {
        let fields: Vec<(String, Value)> = match self {
            Filters::Structured(f) => f.fields(),
            Filters::Raw(map) => map.into_iter().collect(),
        };
        fields
            .into_iter()
            .filter_map(|(name, value)| value_to_query_string(&value).map(|v| (name, v)))
            .collect()
    }
}

fn value_to_query_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Validates `"<field> <direction>"` syntax only; field names are the
/// concrete client's responsibility.
fn validate_sort_by(sort_by: &str) -> Result<String> {
    let mut parts = sort_by.split_whitespace();
    let field = parts
        .next()
        .ok_or_else(|| FrameworkError::validation("sort_by must not be empty"))?;
    let direction = parts
        .next()
        .ok_or_else(|| FrameworkError::validation("sort_by must be '<field> <direction>'"))?;
    if parts.next().is_some() {
        return Err(FrameworkError::validation(
            "sort_by must contain exactly one field and one direction",
        ));
    }
    match direction {
        "asc" | "desc" => Ok(format!("{field} {direction}")),
        other => Err(FrameworkError::validation(format!(
            "sort_by direction must be 'asc' or 'desc', got '{other}'"
        ))),
    }
}

/// A single page of results, carrying the header fields an API typically
/// reports alongside the items (§4.7.2's "typed response carrying header +
/// results").
#[derive(Debug, Clone)]
pub struct SearchResponse<T> {
    pub results: Vec<T>,
    pub total: Option<u64>,
    pub next_cursor: Option<String>,
}

/// A named resource (e.g. "works") reachable via search-style GETs against
/// `path`. Deserializes raw envelope items into `T`.
pub struct ResourceBinding {
    engine: Arc<RequestEngine>,
    path: String,
}

impl ResourceBinding {
    pub fn new(engine: Arc<RequestEngine>, path: impl Into<String>) -> Self {
        Self {
            engine,
            path: path.into(),
        }
    }

    /// §4.7.1. Surfaces `NotFoundError` on zero results, never an empty `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        id: &str,
        extra_filters: Option<Filters>,
    ) -> Result<T> {
        let mut query = vec![("id".to_string(), id.to_string()), ("page_size".to_string(), "1".to_string())];
        if let Some(filters) = extra_filters {
            query.extend(filters.into_query_pairs());
        }

        let doc = self
            .engine
            .request(RequestSpec::get(self.path.as_str()).extend_query(query))
            .await?;

        let mut results = self.engine.envelope().results(&doc);
        if results.is_empty() {
            return Err(FrameworkError::not_found(None, None));
        }
        let raw = results.remove(0);
        serde_json::from_value(raw)
            .map_err(|e| FrameworkError::validation(format!("could not deserialize item: {e}")))
    }

    /// §4.7.2. Never re-paginates; returns exactly what the server supplied.
    pub async fn search<T: DeserializeOwned>(
        &self,
        page: u32,
        page_size: u32,
        sort_by: Option<&str>,
        filters: Option<Filters>,
    ) -> Result<SearchResponse<T>> {
        if page == 0 {
            return Err(FrameworkError::validation("page must be >= 1"));
        }
        if page_size == 0 {
            return Err(FrameworkError::validation("page_size must be >= 1"));
        }

        let query = self.build_query(page, page_size, sort_by, filters)?;
        let doc = self
            .engine
            .request(RequestSpec::get(self.path.as_str()).extend_query(query))
            .await?;

        let results = self
            .engine
            .envelope()
            .results(&doc)
            .into_iter()
            .map(|raw| {
                serde_json::from_value(raw)
                    .map_err(|e| FrameworkError::validation(format!("could not deserialize item: {e}")))
            })
            .collect::<Result<Vec<T>>>()?;

        Ok(SearchResponse {
            results,
            total: self.engine.envelope().total(&doc),
            next_cursor: self.engine.envelope().next_cursor(&doc),
        })
    }

    /// §4.7.3. One-shot, lazy; terminates when `next_cursor` is `none`.
    /// Dropping the stream halts iteration at the next yield boundary.
    pub fn iterate<T: DeserializeOwned + 'static>(
        &self,
        page_size: u32,
        sort_by: Option<&str>,
        filters: Option<Filters>,
    ) -> Result<impl Stream<Item = Result<T>> + 'static> {
        if page_size == 0 {
            return Err(FrameworkError::validation("page_size must be >= 1"));
        }
        let sort_by = sort_by.map(validate_sort_by).transpose()?;

        let mut extra_query = Vec::new();
        if let Some(sort_by) = sort_by {
            extra_query.push(("sort".to_string(), sort_by));
        }
        if let Some(filters) = filters {
            extra_query.extend(filters.into_query_pairs());
        }

        let state = IterState {
            engine: self.engine.clone(),
            path: self.path.clone(),
            extra_query,
            page_size,
            cursor: None,
            buffer: VecDeque::new(),
            done: false,
        };

        Ok(stream::unfold(state, iterate_step::<T>))
    }

    fn build_query(
        &self,
        page: u32,
        page_size: u32,
        sort_by: Option<&str>,
        filters: Option<Filters>,
    ) -> Result<Vec<(String, String)>> {
        let mut query = vec![
            ("page".to_string(), page.to_string()),
            ("page_size".to_string(), page_size.to_string()),
        ];
        if let Some(sort_by) = sort_by {
            query.push(("sort".to_string(), validate_sort_by(sort_by)?));
        }
        if let Some(filters) = filters {
            query.extend(filters.into_query_pairs());
        }
        Ok(query)
    }
}

struct IterState {
    engine: Arc<RequestEngine>,
    path: String,
    extra_query: Vec<(String, String)>,
    page_size: u32,
    cursor: Option<String>,
    buffer: VecDeque<Value>,
    done: bool,
}

async fn iterate_step<T: DeserializeOwned>(mut state: IterState) -> Option<(Result<T>, IterState)> {
    loop {
        if let Some(raw) = state.buffer.pop_front() {
            let item = serde_json::from_value(raw)
                .map_err(|e| FrameworkError::validation(format!("could not deserialize item: {e}")));
            return Some((item, state));
        }
        if state.done {
            return None;
        }

        let cursor = state.cursor.clone().unwrap_or_else(|| INITIAL_CURSOR.to_string());
        let mut query = state.extra_query.clone();
        query.push(("cursor".to_string(), cursor));
        query.push(("page_size".to_string(), state.page_size.to_string()));

        let doc = match state
            .engine
            .request(RequestSpec::get(state.path.as_str()).extend_query(query))
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                state.done = true;
                return Some((Err(e), state));
            }
        };

        let results = state.engine.envelope().results(&doc);
        let next_cursor = state.engine.envelope().next_cursor(&doc);
        state.buffer.extend(results);
        match next_cursor {
            Some(c) => state.cursor = Some(c),
            None => state.done = true,
        }

        if state.buffer.is_empty() && state.done {
            return None;
        }
    }
}
