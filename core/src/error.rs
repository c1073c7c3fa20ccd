//! Error types for the request engine.
//!
//! # Design
//! These errors never reach the caller directly. Every worker converts an
//! `HttpCallError` into a notification flag at its boundary, so the enum is
//! shaped around that classification: URL problems map to `WRONG_URL`,
//! everything else to `ERROR_MESSAGE`. Non-success status codes are not
//! errors at this level; the transfer engine reports them as
//! `REQUEST_UNACCEPTED` after decoding the error body.

use thiserror::Error;

use crate::flag::Flag;

/// Result type for engine-internal operations.
pub type HttpCallResult<T> = Result<T, HttpCallError>;

/// Errors raised while preparing or running one request.
#[derive(Debug, Error)]
pub enum HttpCallError {
    /// The URL string could not be parsed (or was missing).
    #[error("malformed url `{url}`: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The URL parsed but does not use `http` or `https`.
    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),

    /// A body write was attempted on a connection opened without output.
    #[error("connection for {0} requests has no output stream")]
    OutputDisabled(&'static str),

    /// The transport failed to connect, send or receive.
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    /// Local I/O failed (body spooling, file storage, stream decode).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HttpCallError {
    /// The notification flag under which this error is reported.
    pub fn flag(&self) -> Flag {
        match self {
            HttpCallError::MalformedUrl { .. } | HttpCallError::UnsupportedScheme(_) => {
                Flag::WrongUrl
            }
            _ => Flag::ErrorMessage,
        }
    }
}

impl From<serde_json::Error> for HttpCallError {
    fn from(err: serde_json::Error) -> Self {
        HttpCallError::Config(err.to_string())
    }
}
