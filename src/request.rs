use std::collections::BTreeMap;

use thiserror::Error;

use crate::geometry::Bbox;
use crate::http::Method;
use crate::settings::Settings;
use crate::xml::parse_body;

/// Reasons a request could not be turned into its canonical form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidInteger { name: String, value: String },
    #[error("{0}")]
    InvalidBbox(String),
    #[error("malformed XML request body: {0}")]
    MalformedBody(String),
}

/// Raw transport input for a single call.
#[derive(Debug, Clone)]
pub struct RequestInput {
    pub method: Method,
    pub query: String,
    pub body: Option<Vec<u8>>,
}

impl RequestInput {
    pub fn get(query: &str) -> Self {
        RequestInput {
            method: Method::Get,
            query: query.to_string(),
            body: None,
        }
    }

    pub fn post(query: &str, body: impl Into<Vec<u8>>) -> Self {
        RequestInput {
            method: Method::Post,
            query: query.to_string(),
            body: Some(body.into()),
        }
    }
}

/// Feature paging window: skip `start_index` features, then serve at most `max_features`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub start_index: usize,
    pub max_features: Option<usize>,
}

impl Pagination {
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let limit = self.max_features.unwrap_or(usize::MAX);
        items
            .into_iter()
            .skip(self.start_index)
            .take(limit)
            .collect()
    }
}

/// The canonical form of a request, whatever transport it arrived on.
///
/// `service`, `version` and `operation` are derived once while parsing.
/// Filters may rewrite parameters afterwards without the identity changing
/// under them.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    parameters: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    project_path: Option<String>,
    service: String,
    version: String,
    operation: String,
    spatial_filter: Option<Bbox>,
    pagination: Pagination,
}

impl Request {
    /// Builds the canonical request.
    ///
    /// # Arguments
    ///
    /// * `input` - Method, raw query string and optional POST body.
    /// * `settings` - Supplies the forced and default project paths.
    ///
    /// # Returns
    ///
    /// The request, plus the first error found. Parsing never loses the
    /// request, so filters still run and the error can be reported as a
    /// service exception.
    pub fn parse(input: &RequestInput, settings: &Settings) -> (Request, Option<RequestError>) {
        let mut parameters = parse_query(&input.query);
        let mut errors = Vec::new();
        let mut body_filter = None;

        let body = match input.method {
            Method::Post => input.body.clone(),
            _ => None,
        };

        if let Some(raw) = body.as_deref().filter(|b| !b.iter().all(u8::is_ascii_whitespace)) {
            match parse_body(raw) {
                Ok(post) => {
                    // A structured body supersedes the URL.
                    parameters.insert("REQUEST".to_string(), post.operation);
                    let overrides = [
                        ("SERVICE", post.service),
                        ("VERSION", post.version),
                        ("STARTINDEX", post.start_index),
                        ("MAXFEATURES", post.max_features),
                    ];
                    for (name, value) in overrides {
                        if let Some(value) = value {
                            parameters.insert(name.to_string(), value);
                        }
                    }
                    if !post.type_names.is_empty() {
                        parameters.insert("TYPENAME".to_string(), post.type_names.join(","));
                    }
                    body_filter = post.bbox;
                }
                Err(e) => errors.push(e),
            }
        }

        let spatial_filter = match body_filter {
            Some(bbox) => Some(bbox),
            None => match parameters.get("BBOX").filter(|v| !v.is_empty()) {
                Some(value) => match Bbox::parse_query(value) {
                    Ok(bbox) => Some(bbox),
                    Err(e) => {
                        errors.push(RequestError::InvalidBbox(e));
                        None
                    }
                },
                None => None,
            },
        };

        let mut pagination = Pagination::default();
        match parse_count(&parameters, "STARTINDEX") {
            Ok(value) => pagination.start_index = value.unwrap_or(0),
            Err(e) => errors.push(e),
        }
        match parse_count(&parameters, "MAXFEATURES") {
            Ok(value) => pagination.max_features = value,
            Err(e) => errors.push(e),
        }

        let operation = parameters
            .get("REQUEST")
            .map(|r| r.trim().to_uppercase())
            .unwrap_or_default();
        let mut service = parameters
            .get("SERVICE")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_default();
        if service.is_empty() && (operation == "GETMAP" || operation == "GETFEATUREINFO") {
            service = "WMS".to_string();
        }
        let version = parameters
            .get("VERSION")
            .map(|v| v.trim().to_uppercase())
            .unwrap_or_default();

        let project_path = settings
            .project_file
            .clone()
            .or_else(|| parameters.get("MAP").filter(|m| !m.is_empty()).cloned())
            .or_else(|| settings.default_project.clone());

        let request = Request {
            method: input.method.clone(),
            parameters,
            body,
            project_path,
            service,
            version,
            operation,
            spatial_filter,
            pagination,
        };

        (request, errors.into_iter().next())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Looks up a parameter; the name is matched case-insensitively.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_uppercase())
            .map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    pub fn set_parameter(&mut self, name: &str, value: &str) {
        self.parameters
            .insert(name.to_uppercase(), value.to_string());
    }

    pub fn remove_parameter(&mut self, name: &str) -> Option<String> {
        self.parameters.remove(&name.to_uppercase())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn project_path(&self) -> Option<&str> {
        self.project_path.as_deref()
    }

    /// Uppercase service name, empty when none was given.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Explicitly re-targets the request at another service.
    pub fn set_service(&mut self, service: &str) {
        self.service = service.trim().to_uppercase();
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Uppercase operation name, empty when none was given.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn spatial_filter(&self) -> Option<&Bbox> {
        self.spatial_filter.as_ref()
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }
}

/// Splits a query string into uppercase keys and percent-decoded values.
///
/// The last occurrence of a repeated key wins.
pub fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = decode(split.next().unwrap_or(""));
            let value = decode(split.next().unwrap_or(""));
            (key.trim().to_uppercase(), value)
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned(),
    }
}

fn parse_count(
    parameters: &BTreeMap<String, String>,
    name: &str,
) -> Result<Option<usize>, RequestError> {
    match parameters.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<usize>()
            .map(Some)
            .map_err(|_| RequestError::InvalidInteger {
                name: name.to_string(),
                value: value.to_string(),
            }),
    }
}
