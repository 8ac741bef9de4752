use std::fmt::Display;
use std::sync::Arc;

use tracing::{debug, error};

use crate::filter::{FilterError, FilterMap, ServerFilter};
use crate::request::Request;
use crate::response::Response;

/// The three points at which filters are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestReady,
    ResponseComplete,
    SendResponse,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::RequestReady => write!(f, "requestReady"),
            Phase::ResponseComplete => write!(f, "responseComplete"),
            Phase::SendResponse => write!(f, "sendResponse"),
        }
    }
}

/// Runs one request's filters, phase by phase.
///
/// Built from a registry snapshot, so every phase of a request sees the
/// same filters in the same order: ascending priority, then registration
/// order. A failing hook stops the rest of its phase.
pub struct FilterChain {
    filters: Arc<FilterMap>,
}

impl FilterChain {
    pub fn new(filters: Arc<FilterMap>) -> Self {
        FilterChain { filters }
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn ServerFilter>> {
        self.filters.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered().next().is_none()
    }

    pub fn request_ready(&self, request: &mut Request) -> Result<(), FilterError> {
        self.each(Phase::RequestReady, |filter| filter.request_ready(request))
    }

    pub fn response_complete(
        &self,
        request: &Request,
        response: &mut Response,
    ) -> Result<(), FilterError> {
        self.each(Phase::ResponseComplete, |filter| {
            filter.response_complete(request, response)
        })
    }

    pub fn send_response(&self, request: &Request, response: &mut Response) -> Result<(), FilterError> {
        self.each(Phase::SendResponse, |filter| filter.send_response(request, response))
    }

    /// Invokes `hook` on every filter in order, stopping at the first error.
    fn each<F>(&self, phase: Phase, mut hook: F) -> Result<(), FilterError>
    where
        F: FnMut(&dyn ServerFilter) -> Result<(), FilterError>,
    {
        for filter in self.ordered() {
            debug!("{} {}", filter.name(), phase);
            hook(filter.as_ref()).inspect_err(|e| report(filter.as_ref(), phase, e))?;
        }
        Ok(())
    }
}

fn report(filter: &dyn ServerFilter, phase: Phase, error: &FilterError) {
    error!("Filter {} failed in {}: {}", filter.name(), phase, error);
}
