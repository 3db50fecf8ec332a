//! Error types for request construction and completion.
//!
//! # Design
//! `OptionsError` is the only error a caller can see before a `Request`
//! exists; it is returned synchronously from construction. Everything that
//! can go wrong after `submit` is a `RequestError` and is delivered through
//! the completion path. Status failures and transport failures are kept as
//! separate variants so a caller can tell a well-formed error response from
//! a broken connection.

use thiserror::Error;

/// Rejected construction options. No network activity has happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Neither `url` nor `hostname` was supplied.
    #[error("no destination: either `url` or `hostname` is required")]
    MissingDestination,

    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Only `http` and `https` are supported.
    #[error("unsupported protocol `{0}`")]
    UnsupportedProtocol(String),

    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    /// A loosely typed options document had the wrong shape, e.g. a
    /// non-string `url` or non-object `headers`.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Failed outcome of a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The transport could not connect or failed mid-transfer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with status >= 400. `message` is the response
    /// body, or the reason phrase when the body was empty.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The body did not decode as the declared data type.
    #[error("decode failed: {0}")]
    Decode(String),

    /// `abort()` was called before the request settled.
    #[error("request aborted")]
    Aborted,

    /// A typed request body could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl RequestError {
    /// Status code for protocol failures, `None` for every other kind.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
