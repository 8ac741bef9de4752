use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{Ready, ready};

use crate::http::{Method, Request, Response, StatusCode};
use crate::ows::OwsServer;
use crate::request::RequestInput;

/// A trait representing an asynchronous service.
pub trait Service {
    /// The type of response returned by the service.
    type Response;
    /// The type of error that can occur within the service.
    type Error;
    /// The future type returned by the service.
    type Future: Future<Output = Result<Self::Response, Self::Error>>;

    /// Polls to check if the service is ready to accept a request.
    ///
    /// # Arguments
    ///
    /// * `cx` - The context of the current task.
    ///
    /// # Returns
    ///
    /// A `Poll` indicating if the service is ready or not.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;

    /// Calls the service with a request.
    ///
    /// # Arguments
    ///
    /// * `request` - The request to be processed by the service.
    ///
    /// # Returns
    ///
    /// A future representing the result of the service call.
    fn call(&mut self, request: Request) -> Self::Future;
}

/// A trait representing a layer that wraps a service.
pub trait Layer<S> {
    /// The type of service produced by the layer.
    type Service;

    /// Wraps the given service with the layer.
    ///
    /// # Arguments
    ///
    /// * `service` - The service to be wrapped.
    ///
    /// # Returns
    ///
    /// The wrapped service.
    fn layer(&self, service: S) -> Self::Service;
}

/// A builder for constructing a service with layers.
pub struct ServiceBuilder<S> {
    service: S,
}

impl<S> ServiceBuilder<S> {
    /// Creates a new `ServiceBuilder` with the given service.
    ///
    /// # Arguments
    ///
    /// * `service` - The service to be built.
    ///
    /// # Returns
    ///
    /// A new `ServiceBuilder` instance.
    pub fn new(service: S) -> Self {
        ServiceBuilder { service }
    }

    /// Adds a layer to the service.
    ///
    /// # Arguments
    ///
    /// * `layer` - The layer to be added.
    ///
    /// # Returns
    ///
    /// A new `ServiceBuilder` with the layer added.
    pub fn layer<L>(self, layer: L) -> ServiceBuilder<L::Service>
    where
        L: Layer<S>,
    {
        ServiceBuilder {
            service: layer.layer(self.service),
        }
    }

    /// Builds the service.
    ///
    /// # Returns
    ///
    /// The constructed service.
    pub fn build(self) -> S {
        self.service
    }
}

/// Adapts an [`OwsServer`] to the HTTP front-end.
///
/// `GET` and `POST` are forwarded with the raw query string; a `POST` body
/// is handed over untouched. Other methods get `405`.
#[derive(Clone)]
pub struct OwsService {
    server: Arc<OwsServer>,
}

impl OwsService {
    pub fn new(server: Arc<OwsServer>) -> Self {
        OwsService { server }
    }
}

impl Service for OwsService {
    type Response = Response;
    type Error = String;
    type Future = Ready<Result<Response, String>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let input = match request.method {
            Method::Get => RequestInput::get(&request.query),
            Method::Post => RequestInput::post(&request.query, request.body),
            _ => {
                return ready(Ok(Response::plain(
                    StatusCode::MethodNotAllowed,
                    "Method Not Allowed",
                )));
            }
        };

        let assembled = self.server.handle_request(&input);
        ready(Ok(Response::from_assembled(assembled)))
    }
}

#[cfg(test)]
mod tests {
    use futures_executor::block_on;

    use super::*;
    use crate::backend::MemoryProjectStore;
    use crate::http::parser::parse;
    use crate::render::DocumentRenderer;
    use crate::settings::Settings;

    fn service() -> OwsService {
        OwsService::new(Arc::new(OwsServer::new(
            Settings::default(),
            Arc::new(MemoryProjectStore::new()),
            Arc::new(DocumentRenderer),
        )))
    }

    #[test]
    fn test_get_is_forwarded() {
        let request = parse(b"GET /?SERVICE=WMS HTTP/1.1\r\n\r\n").unwrap();
        let response = block_on(service().call(request)).unwrap();
        assert_eq!(response.status_code, StatusCode::OK);
        assert_eq!(response.header("Content-Length"), Some("197"));
        assert_eq!(response.header("Content-Type"), Some("text/xml; charset=utf-8"));
    }

    #[test]
    fn test_unsupported_method() {
        let request = parse(b"DELETE / HTTP/1.1\r\n\r\n").unwrap();
        let response = block_on(service().call(request)).unwrap();
        assert_eq!(response.status_code, StatusCode::MethodNotAllowed);
    }

    #[test]
    fn test_service_builder_without_layers() {
        let mut service = ServiceBuilder::new(service()).build();
        let ready = block_on(futures::future::poll_fn(|cx| service.poll_ready(cx)));
        assert!(ready.is_ok());
    }
}
