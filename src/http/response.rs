use super::{StatusCode, Version};
use crate::response::AssembledResponse;

pub const SERVER_NAME: &str = concat!("ows-server/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct Response {
    pub version: Version,
    pub status_code: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a new `Response` with the given status code.
    ///
    /// # Arguments
    ///
    /// * `status_code` - The HTTP status code for the response.
    ///
    /// # Returns
    ///
    /// A new `Response` object with the specified status code, HTTP version set to HTTP/1.1,
    /// `Server` and `Date` headers, and an empty body.
    pub fn new(status_code: StatusCode) -> Response {
        let headers = vec![
            ("Server".to_string(), SERVER_NAME.to_string()),
            (
                "Date".to_string(),
                format!("{}", chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT")),
            ),
        ];

        Response {
            version: Version::HTTP1_1,
            status_code,
            headers,
            body: Vec::new(),
        }
    }

    /// Wraps the output of the OWS pipeline for the wire.
    ///
    /// The pipeline's headers follow `Server` and `Date`, in the same order.
    pub fn from_assembled(assembled: AssembledResponse) -> Response {
        let mut response = Response::new(StatusCode::from_u16(assembled.status));
        response.headers.extend(assembled.headers);
        response.body = assembled.body;
        response
    }

    /// Replaces a header, or appends it when absent.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets the body of the response and updates the "Content-Length" header.
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
        let length = self.body.len().to_string();
        self.set_header("Content-Length", &length);
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.set_header("Content-Type", content_type);
    }

    /// Plain-text reply used for transport-level failures.
    pub fn plain(status_code: StatusCode, text: &str) -> Response {
        let mut response = Response::new(status_code);
        response.set_content_type("text/plain; charset=utf-8");
        response.set_body(text.as_bytes().to_vec());
        response
    }

    /// Converts the response to a vector of bytes suitable for sending over a network.
    ///
    /// # Returns
    ///
    /// A vector of bytes representing the entire HTTP response, including the status line,
    /// headers, and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut response = Vec::with_capacity(self.body.len() + 256);

        let status_line = format!(
            "{} {} {}\r\n",
            self.version,
            self.status_code as u16,
            self.status_code.reason_phrase()
        );
        response.extend_from_slice(status_line.as_bytes());

        for (key, value) in &self.headers {
            response.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        response.extend_from_slice(b"Connection: close\r\n\r\n");

        response.extend_from_slice(&self.body);

        response
    }
}
