//! Externally supplied request/response filters and their registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::request::Request;
use crate::response::Response;

/// Failure raised from inside a filter hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        FilterError(message.into())
    }
}

/// A plugin observing (and possibly rewriting) requests and responses.
///
/// Every hook defaults to a no-op, so a filter only implements the phases it
/// cares about. Filters are shared between concurrent requests; any state
/// they keep needs interior mutability.
pub trait ServerFilter: Send + Sync {
    /// Called before the operation is dispatched. The response does not exist yet.
    fn request_ready(&self, _request: &mut Request) -> Result<(), FilterError> {
        Ok(())
    }

    /// Called once the dispatcher produced its response.
    fn response_complete(
        &self,
        _request: &Request,
        _response: &mut Response,
    ) -> Result<(), FilterError> {
        Ok(())
    }

    /// Called right before the response is assembled and sent.
    fn send_response(
        &self,
        _request: &Request,
        _response: &mut Response,
    ) -> Result<(), FilterError> {
        Ok(())
    }

    /// Name used in log lines.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Registered filters, keyed by priority. Lists keep registration order.
pub type FilterMap = BTreeMap<i32, Vec<Arc<dyn ServerFilter>>>;

/// The filters of one server instance.
///
/// Readers get an immutable snapshot; writers publish a new map
/// (copy-on-write), so a request never sees a registry changing under it.
pub struct FilterRegistry {
    filters: ArcSwap<FilterMap>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        FilterRegistry {
            filters: ArcSwap::from_pointee(FilterMap::new()),
        }
    }

    /// Appends `filter` to the list at `priority`.
    ///
    /// # Arguments
    ///
    /// * `filter` - The filter to invoke.
    /// * `priority` - Lower priorities run first; equal priorities run in
    ///   registration order.
    ///
    /// The same instance may be registered more than once, under the same or
    /// different priorities; every registration is invoked.
    pub fn register(&self, filter: Arc<dyn ServerFilter>, priority: i32) {
        self.filters.rcu(|current| {
            let mut next = FilterMap::clone(current);
            next.entry(priority).or_default().push(Arc::clone(&filter));
            next
        });
    }

    /// Replaces the whole registry with `filters`, duplicates included.
    ///
    /// # Arguments
    ///
    /// * `filters` - Priority to filters, each list in invocation order.
    pub fn set_all(&self, filters: FilterMap) {
        self.filters.store(Arc::new(filters));
    }

    /// Takes a snapshot of the registry.
    ///
    /// # Returns
    ///
    /// Ascending priorities, each with its registration-order list. Later
    /// writes publish a new map and leave the snapshot untouched.
    pub fn enumerate(&self) -> Arc<FilterMap> {
        self.filters.load_full()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.filters.load().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.filters.load();
        let mut map = f.debug_map();
        for (priority, filters) in snapshot.iter() {
            let names: Vec<&str> = filters.iter().map(|filter| filter.name()).collect();
            map.entry(priority, &names);
        }
        map.finish()
    }
}
