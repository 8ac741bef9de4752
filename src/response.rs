use tracing::warn;

use crate::exception::{EXCEPTION_CONTENT_TYPE, ServiceException};

/// Content type used when nothing in the pipeline declared one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_LENGTH: &str = "Content-Length";

/// Response under construction for a single request.
///
/// Filled by the dispatcher and the filters, then consumed by
/// [`Response::finish`].
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new() -> Response {
        Response {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    /// Sets a header unless one with the same (case-insensitive) name exists.
    ///
    /// # Arguments
    ///
    /// * `name` - Header name; must be non-empty and free of `:`, CR and LF.
    /// * `value` - Header value; must be free of CR and LF.
    ///
    /// # Returns
    ///
    /// Whether the header was written. Use [`Response::remove_header`] or
    /// [`Response::clear_headers`] first to replace a value. Names or values
    /// that would break the header block are refused.
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        if !valid_header(name, value) {
            warn!("Refusing header '{}' with a line break or invalid name", name.escape_debug());
            return false;
        }
        if self.header(name).is_some() {
            return false;
        }
        self.headers.push((name.to_string(), value.to_string()));
        true
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let index = self
            .headers
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(index).1)
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn clear_body(&mut self) {
        self.body.clear();
    }

    pub fn append_body(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Replaces whatever was produced so far with an exception report.
    pub fn set_exception(&mut self, exception: &ServiceException, version: &str) {
        self.clear_headers();
        self.clear_body();
        self.set_header(CONTENT_TYPE, EXCEPTION_CONTENT_TYPE);
        self.append_body(&exception.to_report(version));
        self.status = exception.status();
    }

    /// Finalizes the response into its header block and body.
    ///
    /// `Content-Length` is computed here from the final body; any earlier
    /// value is discarded.
    ///
    /// # Returns
    ///
    /// An `AssembledResponse` whose header block lists `Content-Length`, then
    /// `Content-Type` (defaulting to [`DEFAULT_CONTENT_TYPE`]), then the other
    /// headers in insertion order, terminated by a blank line.
    pub fn finish(self) -> AssembledResponse {
        let content_type = self
            .header(CONTENT_TYPE)
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let mut headers = vec![
            (CONTENT_LENGTH.to_string(), self.body.len().to_string()),
            (CONTENT_TYPE.to_string(), content_type),
        ];
        headers.extend(self.headers.into_iter().filter(|(key, _)| {
            !key.eq_ignore_ascii_case(CONTENT_TYPE) && !key.eq_ignore_ascii_case(CONTENT_LENGTH)
        }));

        let mut header = Vec::new();
        for (key, value) in &headers {
            header.extend_from_slice(format!("{}: {}\n", key, value).as_bytes());
        }
        // Blank line separating headers and body
        header.push(b'\n');

        AssembledResponse {
            status: self.status,
            headers,
            header,
            body: self.body,
        }
    }
}

fn valid_header(name: &str, value: &str) -> bool {
    let line_break = |c: char| c == '\r' || c == '\n';
    !name.trim().is_empty()
        && !name.contains(':')
        && !name.contains(line_break)
        && !value.contains(line_break)
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished response: serialized header block plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledResponse {
    pub status: u16,
    /// Final header list, in the order of the header block.
    pub headers: Vec<(String, String)>,
    /// `Name: Value` lines terminated by a blank line.
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

impl AssembledResponse {
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Header block followed by the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header.len() + self.body.len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ServiceError;

    #[test]
    fn test_line_breaks_never_reach_header_block() {
        let mut response = Response::new();
        assert!(!response.set_header("X-Name", "a\n\nInjected"));
        assert!(!response.set_header("X-Name", "a\r\nSet-Cookie: x"));
        assert!(!response.set_header("X-Bad\nName", "v"));
        assert!(!response.set_header("X:Name", "v"));
        assert!(response.set_header("X-Name", "ok"));

        let assembled = response.finish();
        let header = String::from_utf8(assembled.header).unwrap();
        assert_eq!(header.find("\n\n"), Some(header.len() - 2));
        assert!(header.ends_with("X-Name: ok\n\n"));
    }

    #[test]
    fn test_first_header_write_wins() {
        let mut response = Response::new();
        assert!(response.set_header("Content-Type", "image/png"));
        assert!(!response.set_header("content-type", "text/html"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("image/png"));

        response.remove_header("Content-type");
        assert!(response.set_header("Content-type", "text/html"));
        assert_eq!(response.header("Content-Type"), Some("text/html"));
    }

    #[test]
    fn test_finish_computes_length_and_block() {
        let mut response = Response::new();
        response.set_header("Content-type", "text/plain");
        response.set_header("Content-Length", "999");
        response.set_header("X-First", "1");
        response.set_header("X-Second", "2");
        response.append_body(b"Hello");

        let assembled = response.finish();
        assert_eq!(
            assembled.header,
            b"Content-Length: 5\nContent-Type: text/plain\nX-First: 1\nX-Second: 2\n\n".to_vec()
        );
        assert_eq!(assembled.body, b"Hello".to_vec());
        assert_eq!(assembled.to_bytes().len(), assembled.header.len() + 5);
    }

    #[test]
    fn test_empty_body_and_default_content_type() {
        let assembled = Response::new().finish();
        assert_eq!(assembled.header_value("content-length"), Some("0"));
        assert_eq!(assembled.header_value("Content-Type"), Some(DEFAULT_CONTENT_TYPE));
        assert!(assembled.header.ends_with(b"\n\n"));
    }

    #[test]
    fn test_large_body_length() {
        let mut response = Response::new();
        response.set_header("Content-Type", "image/png");
        response.append_body(&vec![0x89; 8 * 1024 + 3]);
        let assembled = response.finish();
        assert_eq!(assembled.header_value("Content-Length"), Some("8195"));
    }

    #[test]
    fn test_split_is_unambiguous() {
        let mut response = Response::new();
        response.append_body(b"line\n\nwith blank lines");
        let assembled = response.finish();
        let bytes = assembled.to_bytes();
        let split = bytes.windows(2).position(|w| w == b"\n\n").unwrap() + 2;
        assert_eq!(&bytes[..split], assembled.header.as_slice());
        assert_eq!(&bytes[split..], assembled.body.as_slice());
    }

    #[test]
    fn test_set_exception_replaces_everything() {
        let mut response = Response::new();
        response.set_header("Content-Disposition", "attachment");
        response.append_body(b"partial");
        response.set_exception(&ServiceError::SizeLimit.into(), "1.3.0");

        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.header("Content-Type"), Some(EXCEPTION_CONTENT_TYPE));
        assert!(response.body().starts_with(b"<ServiceExceptionReport"));
        assert_eq!(response.status(), 200);
    }
}
