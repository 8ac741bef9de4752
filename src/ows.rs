use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::backend::{ProjectStore, Renderer};
use crate::chain::FilterChain;
use crate::dispatcher::{Dispatcher, report_version};
use crate::exception::{ServiceError, ServiceException};
use crate::filter::FilterRegistry;
use crate::request::{Request, RequestInput};
use crate::response::{AssembledResponse, Response};
use crate::settings::Settings;

/// One OGC web service endpoint.
///
/// Owns its filter registry and collaborators; nothing is shared between
/// instances, so any number of servers can live in the same process.
pub struct OwsServer {
    settings: Settings,
    filters: FilterRegistry,
    dispatcher: Dispatcher,
}

impl OwsServer {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ProjectStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let dispatcher = Dispatcher::new(store, renderer, settings.max_width, settings.max_height);
        OwsServer {
            settings,
            filters: FilterRegistry::new(),
            dispatcher,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Serves a GET request given its query string, returning `(header, body)`.
    pub fn handle_query(&self, query: &str) -> (Vec<u8>, Vec<u8>) {
        let assembled = self.handle_request(&RequestInput::get(query));
        (assembled.header, assembled.body)
    }

    /// Runs a request through parsing, the filter phases and dispatch.
    ///
    /// Never fails: every error ends up as a ServiceExceptionReport body.
    pub fn handle_request(&self, input: &RequestInput) -> AssembledResponse {
        let started = Instant::now();
        let chain = FilterChain::new(self.filters.enumerate());

        let (mut request, parse_error) = Request::parse(input, &self.settings);
        info!(
            "New request: {} service={} request={}",
            request.method(),
            request.service(),
            request.operation()
        );
        for (name, value) in request.parameters() {
            debug!("{}:{}", name, value);
        }

        let mut pending = parse_error.map(ServiceError::from);
        if let Err(e) = chain.request_ready(&mut request) {
            pending = Some(e.into());
        }

        let mut response = Response::new();
        let outcome = match pending {
            Some(error) => Err(error),
            None => self.dispatcher.dispatch(&request, &mut response),
        };
        if let Err(error) = outcome {
            raise(&request, &mut response, &error);
        }

        if let Err(e) = chain.response_complete(&request, &mut response) {
            raise(&request, &mut response, &e.into());
        }
        if let Err(e) = chain.send_response(&request, &mut response) {
            raise(&request, &mut response, &e.into());
        }

        let assembled = response.finish();
        info!(
            "Request finished in {} ms ({} bytes)",
            started.elapsed().as_millis(),
            assembled.body.len()
        );
        assembled
    }
}

fn raise(request: &Request, response: &mut Response, error: &ServiceError) {
    let exception = ServiceException::from(error);
    error!("{}: {}", exception.code, exception.message);
    response.set_exception(&exception, report_version(request));
}
