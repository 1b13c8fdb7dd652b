//! Error taxonomy shared by the core and client crates.

use thiserror::Error;

/// Why a request never produced a usable HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The service answered with a non-2xx status. The body is kept for
    /// diagnostics only and is never parsed.
    #[error("unexpected HTTP status {status}")]
    Status { status: u16, body: String },

    /// Connection, TLS, timeout or request-building failure.
    #[error("connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{option} is not an option for the {query} query")]
    UnsupportedOption { query: String, option: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportFailure),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("Technorati API error: {message}")]
    Api { message: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the service answered HTTP 200 with an embedded `<error>`.
    pub fn is_api_error(&self) -> bool {
        matches!(self, Error::Api { .. })
    }

    /// HTTP status of a non-2xx transport failure, if that is what this is.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Transport(TransportFailure::Status { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Short label used as a structured log field.
    pub fn category(&self) -> &'static str {
        match self {
            Error::UnsupportedOption { .. } => "option",
            Error::Transport(_) => "transport",
            Error::MalformedResponse(_) => "parse",
            Error::Api { .. } => "api",
            Error::Cache(_) => "cache",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
