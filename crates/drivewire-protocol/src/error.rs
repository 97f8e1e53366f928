//! DriveWire error taxonomy.
//!
//! Every fault surfaced by this client falls into one of these variants:
//! transport (network/timeout), protocol (malformed or unexpected traffic),
//! HTTP status, server-sent socket errors, and subscription misuse.

use thiserror::Error;

/// Result alias used throughout the DriveWire crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Socket error message the platform sends for an unauthorized client.
const UNAUTHORIZED_CLIENT_MSG: &str = "Unauthorized client.";

#[derive(Debug, Error)]
pub enum Error {
    /// An underlying network or timeout failure, or a double connect.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected protocol traffic.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response body could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Non-success HTTP status returned by the platform.
    #[error("http {status}: {message}")]
    Status { status: u16, message: String },

    /// The platform rejected this client over the realtime channel.
    #[error("unauthorized client: {0}")]
    UnauthorizedClient(String),

    /// Any other error message sent over the realtime channel.
    #[error("socket error: {0}")]
    Socket(String),

    /// Subscription requested for an event kind this client does not know.
    #[error("unknown event kind: {0}")]
    UnknownEventKind(String),
}

impl Error {
    /// Map a server-sent socket error message to its specific variant.
    ///
    /// Only messages with an exact match get a dedicated variant; everything
    /// else becomes a generic [`Error::Socket`] carrying the raw text.
    pub fn socket_error(message: impl Into<String>) -> Self {
        let message = message.into();
        match message.as_str() {
            UNAUTHORIZED_CLIENT_MSG => Self::UnauthorizedClient(message),
            _ => Self::Socket(message),
        }
    }

    /// Build a status error, falling back to the canned description for
    /// the statuses the platform is known to return.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| describe_status(status).to_string());
        Self::Status { status, message }
    }
}

fn describe_status(status: u16) -> &'static str {
    match status {
        400 => "request is malformed",
        401 => "an invalid token is attached to the request",
        403 => "the token doesn't have access to this endpoint",
        404 => "the specified endpoint cannot be found",
        409 => "conflict in request",
        422 => "there is an issue processing the request body",
        500 => "an internal error occurred at the platform",
        _ => "unexpected http status",
    }
}
