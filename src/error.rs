use thiserror::Error;

use crate::http::response::StatusCode;

/// Errors raised while assembling a request from the wire.
///
/// All of these surface to the client as a 400 Bad Request; the connection
/// is closed afterwards because the framing can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("unknown http method: {0}")]
    UnknownMethod(String),
    #[error("malformed header line: {0}")]
    InvalidHeader(String),
    #[error("invalid content-length value")]
    InvalidContentLength,
    #[error("malformed chunked encoding")]
    InvalidChunk,
    #[error("request head is not valid utf-8")]
    InvalidEncoding,
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
}

/// An error a handler chooses to surface as a specific HTTP status.
///
/// Anything else escaping a handler (a panic) is reported as a plain 500.
#[derive(Debug, Clone, Error)]
#[error("{status:?}: {message}")]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Authentication and routing failures always close the connection;
    /// other declared statuses follow the request's keep-alive negotiation.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self.status,
            StatusCode::Unauthorized
                | StatusCode::Forbidden
                | StatusCode::NotFound
                | StatusCode::MethodNotAllowed
        )
    }
}

/// Failure to hand a request to the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker queue is full")]
    Saturated,
    #[error("worker pool is shut down")]
    Closed,
}
