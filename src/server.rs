use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use futures_executor::block_on;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::http::parser::{header_end, parse};
use crate::http::{Response, StatusCode};
use crate::middleware::{LogLayer, LogMiddleware};
use crate::ows::OwsServer;
use crate::service::{OwsService, Service, ServiceBuilder};

/// Upper bound for headers plus body of a single request.
pub const MAX_REQUEST_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Request too large")]
    TooLarge,
}

pub struct Server<S> {
    address: String,
    service: S,
}

impl<S> Server<S>
where
    S: Service<Response = Response, Error = String> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    pub fn new(address: &str, service: S) -> Self {
        Server {
            address: address.to_string(),
            service,
        }
    }

    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(&self.address).map_err(|source| ServerError::Bind {
            address: self.address.clone(),
            source,
        })
    }

    pub fn listen(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        info!("Server listening on {}", self.address);
        self.serve(listener);
        Ok(())
    }

    /// Accepts connections forever, one thread per connection.
    pub fn serve(&self, listener: TcpListener) {
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let mut service = self.service.clone();

                    thread::spawn(move || {
                        if let Err(e) = Self::handle_client(stream, &mut service) {
                            warn!("Error handling client: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Connection failed: {}", e);
                }
            }
        }
    }

    fn handle_client(mut stream: TcpStream, service: &mut S) -> Result<(), ServerError> {
        // Avoid hanging on slow clients
        stream.set_read_timeout(Some(Duration::from_secs(30)))?;

        let request_data = match read_request(&mut stream) {
            Ok(data) => data,
            Err(ServerError::TooLarge) => {
                let response = Response::plain(StatusCode::PayloadTooLarge, "Payload Too Large");
                stream.write_all(&response.to_bytes())?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let request = match parse(&request_data) {
            Ok(req) => req,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                let response = Response::plain(StatusCode::BadRequest, "Bad Request");
                stream.write_all(&response.to_bytes())?;
                return Ok(());
            }
        };

        if let Err(e) = block_on(futures::future::poll_fn(|cx| service.poll_ready(cx))) {
            error!("Service not ready: {}", e);
            let response = Response::plain(StatusCode::ServiceUnavailable, "Service Unavailable");
            stream.write_all(&response.to_bytes())?;
            return Ok(());
        }

        let response = match block_on(service.call(request)) {
            Ok(response) => response,
            Err(e) => {
                error!("Error processing request: {}", e);
                Response::plain(StatusCode::InternalServerError, "Internal Server Error")
            }
        };

        stream.write_all(&response.to_bytes())?;
        stream.flush()?;
        Ok(())
    }
}

/// Reads the header section, then as many body bytes as `Content-Length` announces.
fn read_request(stream: &mut impl Read) -> Result<Vec<u8>, ServerError> {
    let mut buffer = [0; 4096];
    let mut request_data = Vec::new();
    let mut expected: Option<usize> = None;

    loop {
        if let Some(total) = expected {
            if request_data.len() >= total {
                request_data.truncate(total);
                break;
            }
        } else if let Some(body_start) = header_end(&request_data) {
            let total = body_start
                .checked_add(content_length(&request_data[..body_start]))
                .filter(|total| *total <= MAX_REQUEST_SIZE)
                .ok_or(ServerError::TooLarge)?;
            expected = Some(total);
            continue;
        }

        let bytes_read = stream.read(&mut buffer)?;
        if bytes_read == 0 {
            // Connection closed
            break;
        }
        request_data.extend_from_slice(&buffer[..bytes_read]);

        if request_data.len() > MAX_REQUEST_SIZE {
            return Err(ServerError::TooLarge);
        }
    }

    Ok(request_data)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Builds the HTTP front-end for an OWS server, with request logging.
pub fn new_server(address: &str, ows: Arc<OwsServer>) -> Server<LogMiddleware<OwsService>> {
    let service = ServiceBuilder::new(OwsService::new(ows))
        .layer(LogLayer)
        .build();

    Server::new(address, service)
}
