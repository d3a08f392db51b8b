//! Bridge error types

use thiserror::Error;

use crate::protocol::error_codes;

/// Failure while handling an inbound request or notification.
///
/// Every variant maps onto a JSON-RPC error code via [`BridgeError::code`].
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Method not known to the bridge
    #[error("Unknown method: {0}")]
    MethodNotFound(String),

    /// Required parameter missing or of the wrong shape
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// `tools/call` named a tool that is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool or hook body failed
    #[error("{0}")]
    Handler(anyhow::Error),

    /// Tool or hook body panicked
    #[error("Handler panicked: {0}")]
    Panic(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Get the JSON-RPC error code for this error
    pub fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::UnknownTool(_) | Self::Handler(_) | Self::Panic(_) | Self::Json(_) => {
                error_codes::INTERNAL_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Handler(err)
    }
}

/// Bridge result type
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failure of a call the bridge made into the host.
#[derive(Debug, Clone, Error)]
pub enum ReverseCallError {
    /// No response arrived within the configured window
    #[error("Reverse RPC timeout: {method}")]
    Timeout { method: String },

    /// Host answered with an error response
    #[error("{message}")]
    Remote { code: i64, message: String },

    /// Transport shut down before the call settled
    #[error("transport closed")]
    TransportClosed,

    /// Request frame could not be written
    #[error("failed to send {method}: {reason}")]
    Send { method: String, reason: String },

    /// Host answered with a result of an unexpected shape
    #[error("unexpected {method} result: {reason}")]
    UnexpectedResult { method: String, reason: String },
}

impl ReverseCallError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A line that could not be turned into a [`crate::protocol::Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("request is missing a string method")]
    MissingMethod,

    #[error("invalid id: {0}")]
    InvalidId(serde_json::Value),

    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
