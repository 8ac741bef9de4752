use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Instant,
};

use tracing::{info, warn};

use crate::{
    http::{Request, Response},
    service::{Layer, Service},
};

/// Middleware to log requests
pub struct LogLayer;

impl<S> Layer<S> for LogLayer {
    type Service = LogMiddleware<S>;

    /// Wraps the given service with the logging middleware.
    fn layer(&self, service: S) -> Self::Service {
        LogMiddleware { inner: service }
    }
}

/// Middleware service that logs requests and responses.
#[derive(Clone)]
pub struct LogMiddleware<S> {
    inner: S,
}

impl<S> Service for LogMiddleware<S>
where
    S: Service<Response = Response, Error = String> + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Handles the incoming request, logs it, and then logs the response or error.
    fn call(&mut self, req: Request) -> Self::Future {
        info!("Request: {} {} ({} body bytes)", req.method, req.path, req.body.len());

        let started = Instant::now();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            match &result {
                Ok(response) => {
                    info!(
                        "Response: {} in {} ms",
                        response.status_code as u16,
                        started.elapsed().as_millis()
                    );
                }
                Err(e) => {
                    warn!("Error: {}", e);
                }
            }
            result
        })
    }
}
