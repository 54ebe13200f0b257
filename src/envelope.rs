//! Response-envelope contract (§4.3): how to pull results, a single item, a
//! pagination cursor, and a total count out of an opaque JSON document.
//!
//! The framework never inspects JSON structure itself — every concrete
//! client supplies an implementation that knows its API's envelope shape.

use serde_json::Value;

use crate::error::{FrameworkError, Result};

/// Opaque cursor sentinel a concrete client's envelope may treat as "start
/// from the beginning" (§4.7.3). The framework passes this value through
/// without interpreting it.
pub const INITIAL_CURSOR: &str = "*";

/// Abstracts the outer JSON shape of an API response.
pub trait Envelope: Send + Sync {
    /// Extracts the list of raw result items. Returns an empty vector if the
    /// envelope carries none.
    fn results(&self, doc: &Value) -> Vec<Value>;

    /// Extracts a single raw item (object form). Used by [`crate::resource`]'s
    /// get-by-id operation, which already filtered to a single logical
    /// result; this is about pulling that one item out of the envelope, not
    /// about choosing among many.
    fn single(&self, doc: &Value) -> Result<Value> {
        self.results(doc)
            .into_iter()
            .next()
            .ok_or_else(|| FrameworkError::validation("envelope carried no single result"))
    }

    /// Extracts the opaque cursor for the next page, or `None` to terminate
    /// iteration.
    fn next_cursor(&self, doc: &Value) -> Option<String>;

    /// Extracts an informational total result count, if the envelope
    /// reports one.
    fn total(&self, doc: &Value) -> Option<u64>;
}
