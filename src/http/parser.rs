use thiserror::Error;

use super::{Method, Request, Version};

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Invalid request format")]
    Incomplete,
    #[error("Missing request line")]
    MissingRequestLine,
    #[error("Missing {0}")]
    MissingPart(&'static str),
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),
}

/// Finds the end of the header section.
///
/// # Returns
///
/// The offset of the first body byte, if the terminator has arrived.
pub fn header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|position| position + HEADER_TERMINATOR.len())
}

/// Parses a raw HTTP request into a `Request` object.
///
/// # Arguments
///
/// * `raw` - A byte slice containing the raw HTTP request.
///
/// # Returns
///
/// A `Result` containing the parsed `Request` object or a `ParseError`.
pub fn parse(raw: &[u8]) -> Result<Request, ParseError> {
    let body_start = header_end(raw).ok_or(ParseError::Incomplete)?;

    // Headers are text; the body is kept as raw bytes
    let head = String::from_utf8_lossy(&raw[..body_start - HEADER_TERMINATOR.len()]);
    let body = raw[body_start..].to_vec();

    let mut lines = head.lines();
    let request_line = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or(ParseError::MissingRequestLine)?;

    let mut request_parts = request_line.split_whitespace();
    let method = request_parts.next().ok_or(ParseError::MissingPart("method"))?;
    let target = request_parts.next().ok_or(ParseError::MissingPart("path"))?;
    let version = request_parts
        .next()
        .ok_or(ParseError::MissingPart("HTTP version"))?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target.to_string(), String::new()),
    };

    let headers = lines
        .map(|line| {
            line.split_once(':')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Request {
        method: Method::from(method),
        path,
        version: Version::from(version),
        headers,
        query,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_keeps_raw_query() {
        let raw = b"GET /ows?SERVICE=WMS&LAYERS=a%20b HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let request = parse(raw).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/ows");
        assert_eq!(request.query, "SERVICE=WMS&LAYERS=a%20b");
        assert_eq!(request.version, Version::HTTP1_1);
        assert_eq!(request.header("host"), Some("localhost"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_parse_post_body_bytes() {
        let raw = b"POST /?MAP=p HTTP/1.1\r\nContent-Length: 4\r\n\r\n<a/>";
        let request = parse(raw).unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.query, "MAP=p");
        assert_eq!(request.content_length(), Some(4));
        assert_eq!(request.body, b"<a/>");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(b"GET / HTTP/1.1\r\n").unwrap_err(), ParseError::Incomplete);
        assert_eq!(
            parse(b"GET /\r\n\r\n").unwrap_err(),
            ParseError::MissingPart("HTTP version")
        );
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\nbroken\r\n\r\n").unwrap_err(),
            ParseError::MalformedHeader("broken".to_string())
        );
    }

    #[test]
    fn test_header_end() {
        assert_eq!(header_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(header_end(b"GET / HTTP/1.1\r\n"), None);
    }
}
