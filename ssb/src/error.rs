use serde::Serialize;
use ssb_api::SsbError;
use thiserror::Error;

/// Stable, protocol-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Malformed caller input. Never retried.
    InvalidArgument,
    /// Valid input, but the resource does not exist upstream.
    NotFound,
    /// Network-level failure; the caller may retry with backoff.
    UpstreamUnreachable,
    /// Upstream answered with a non-2xx status.
    UpstreamError,
    /// Upstream answered with something that does not match the expected shape.
    UpstreamFormatError,
    /// Upstream refused an overly broad selection.
    PayloadTooLarge,
    /// Local misconfiguration.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::UpstreamUnreachable => "UpstreamUnreachable",
            ErrorKind::UpstreamError => "UpstreamError",
            ErrorKind::UpstreamFormatError => "UpstreamFormatError",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when using the Statbank client
#[derive(Error, Debug)]
pub enum StatbankError {
    /// Malformed caller input
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Table (or other resource) not found upstream
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Could not reach the upstream service
    #[error("Upstream unreachable: {source}")]
    UpstreamUnreachable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Upstream returned a non-2xx response
    #[error("Upstream error ({status}): {message}")]
    UpstreamError { status: u16, message: String },

    /// Upstream response did not match the expected shape
    #[error("Upstream format error: {message}")]
    UpstreamFormatError { message: String },

    /// Upstream rejected the selection as too large
    #[error("Payload too large: {message}")]
    PayloadTooLarge { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl StatbankError {
    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a new not found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new upstream format error
    pub fn format_error<S: Into<String>>(message: S) -> Self {
        Self::UpstreamFormatError {
            message: message.into(),
        }
    }

    /// Create a new payload too large error
    pub fn payload_too_large<S: Into<String>>(message: S) -> Self {
        Self::PayloadTooLarge {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UpstreamUnreachable { .. } => ErrorKind::UpstreamUnreachable,
            Self::UpstreamError { .. } => ErrorKind::UpstreamError,
            Self::UpstreamFormatError { .. } => ErrorKind::UpstreamFormatError,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::Config { .. } => ErrorKind::Internal,
        }
    }

    /// Upstream HTTP status, for `UpstreamError`
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Translate a metadata/data endpoint failure; 404 means the table does
    /// not exist.
    pub(crate) fn from_table_lookup(err: SsbError, table_id: &str) -> Self {
        match err {
            SsbError::ApiError { status: 404, .. } => {
                Self::not_found(format!("table {table_id} does not exist"))
            }
            other => other.into(),
        }
    }

    /// Translate a data endpoint failure; the service refuses oversized
    /// selections with 403 or 413.
    pub(crate) fn from_data_request(err: SsbError, table_id: &str) -> Self {
        match err {
            SsbError::ApiError {
                status: 403 | 413,
                message,
            } => Self::payload_too_large(format!(
                "selection on table {table_id} is too large, narrow it down: {message}"
            )),
            other => Self::from_table_lookup(other, table_id),
        }
    }
}

impl From<SsbError> for StatbankError {
    fn from(err: SsbError) -> Self {
        match err {
            SsbError::RequestError(source) => Self::UpstreamUnreachable { source },
            SsbError::ParseError(e) => Self::format_error(e.to_string()),
            SsbError::ApiError { status, message } => Self::UpstreamError { status, message },
        }
    }
}

/// Type alias for Results using StatbankError
pub type Result<T> = std::result::Result<T, StatbankError>;
