use quick_xml::escape::escape;
use thiserror::Error;

use crate::backend::BackendError;
use crate::filter::FilterError;
use crate::request::RequestError;

/// Content type of every ServiceExceptionReport body.
pub const EXCEPTION_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// OGC version advertised when the request did not name a known service.
pub const DEFAULT_REPORT_VERSION: &str = "1.3.0";

/// Everything that can go wrong while serving a request.
///
/// All variants are turned into a [`ServiceException`] before any filter
/// gets to see the response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("no project could be resolved from the request")]
    ProjectResolution,
    #[error("service unknown or unsupported")]
    ServiceUnsupported,
    #[error("requested map size is too large")]
    SizeLimit,
    #[error("invalid request: {0}")]
    ParameterParse(String),
    #[error("filter hook failed: {0}")]
    FilterHook(String),
    #[error("provider failure: {0}")]
    Provider(String),
}

impl From<RequestError> for ServiceError {
    fn from(error: RequestError) -> Self {
        ServiceError::ParameterParse(error.to_string())
    }
}

impl From<FilterError> for ServiceError {
    fn from(error: FilterError) -> Self {
        ServiceError::FilterHook(error.to_string())
    }
}

impl From<BackendError> for ServiceError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Project(_) => ServiceError::ProjectResolution,
            BackendError::Size => ServiceError::SizeLimit,
            BackendError::Provider(message) => ServiceError::Provider(message),
        }
    }
}

/// The machine readable code and human readable message of one OGC exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceException {
    pub code: String,
    pub message: String,
}

impl ServiceException {
    pub fn new(code: &str, message: &str) -> Self {
        ServiceException {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// HTTP-analogous status for the response carrying this exception.
    pub fn status(&self) -> u16 {
        if self.code == "Internal server error" {
            500
        } else {
            200
        }
    }

    /// Serializes the exception as a single-exception ServiceExceptionReport.
    pub fn to_report(&self, version: &str) -> Vec<u8> {
        format!(
            "<ServiceExceptionReport version=\"{}\" xmlns=\"http://www.opengis.net/ogc\">\n <ServiceException code=\"{}\">{}</ServiceException>\n</ServiceExceptionReport>\n",
            escape(version),
            escape(self.code.as_str()),
            escape(self.message.as_str()),
        )
        .into_bytes()
    }
}

impl From<&ServiceError> for ServiceException {
    fn from(error: &ServiceError) -> Self {
        match error {
            ServiceError::ProjectResolution => {
                ServiceException::new("Project file error", "Error reading the project file")
            }
            ServiceError::ServiceUnsupported => ServiceException::new(
                "Service configuration error",
                "Service unknown or unsupported",
            ),
            ServiceError::SizeLimit => {
                ServiceException::new("Size error", "The requested map size is too large")
            }
            ServiceError::ParameterParse(detail) => ServiceException::new("Request error", detail),
            ServiceError::FilterHook(detail) => ServiceException::new("Internal server error", detail),
            ServiceError::Provider(detail) => ServiceException::new("Provider error", detail),
        }
    }
}

impl From<ServiceError> for ServiceException {
    fn from(error: ServiceError) -> Self {
        ServiceException::from(&error)
    }
}
