//! Error types for the ChatOps RPC endpoint.
//!
//! Every gate a request passes through fails with exactly one variant, and
//! every variant maps to exactly one JSON-RPC code and HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Request-level failures produced while authenticating and dispatching.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatopsError {
    #[error("Parse error")]
    Parse,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("{0}")]
    InvalidParams(String),

    #[error("Not authorized")]
    SignatureMismatch,

    #[error("Missing X-Chatops-Nonce")]
    MissingNonce,

    #[error("Failed to parse signature header")]
    MalformedSignatureHeader,

    #[error("Invalid X-Chatops-Timestamp: {0}")]
    TimestampOutOfWindow(String),

    #[error("Invalid X-Chatops-Timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Missing X-Chatops-Timestamp")]
    MissingTimestamp,

    /// The deployment cannot authenticate anyone. Never an envelope, never a 403.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ChatopsError {
    /// The reserved JSON-RPC error code for this failure.
    ///
    /// Configuration errors have no code; they are not rendered as envelopes.
    pub fn code(&self) -> Option<i64> {
        let code = match self {
            ChatopsError::Parse => -32700,
            ChatopsError::InvalidRequest(_) => -32600,
            ChatopsError::MethodNotFound => -32601,
            ChatopsError::InvalidParams(_) => -32602,
            ChatopsError::SignatureMismatch => -32800,
            ChatopsError::MissingNonce => -32801,
            ChatopsError::MalformedSignatureHeader => -32802,
            ChatopsError::TimestampOutOfWindow(_) => -32803,
            ChatopsError::InvalidTimestamp(_) | ChatopsError::MissingTimestamp => -32804,
            ChatopsError::Configuration(_) => return None,
        };
        Some(code)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatopsError::Parse => StatusCode::INTERNAL_SERVER_ERROR,
            ChatopsError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatopsError::MethodNotFound => StatusCode::NOT_FOUND,
            ChatopsError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ChatopsError::SignatureMismatch
            | ChatopsError::MissingNonce
            | ChatopsError::MalformedSignatureHeader
            | ChatopsError::TimestampOutOfWindow(_)
            | ChatopsError::InvalidTimestamp(_)
            | ChatopsError::MissingTimestamp => StatusCode::FORBIDDEN,
            ChatopsError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ChatopsError::Configuration(_))
    }
}

/// Bare rendering, used for configuration errors and anywhere no request id
/// is available. Envelope rendering lives in [`crate::envelope`].
impl IntoResponse for ChatopsError {
    fn into_response(self) -> Response {
        if let ChatopsError::Configuration(msg) = &self {
            tracing::error!("chatops misconfigured: {msg}");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failure returned by a command handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Surfaced as -32602 with the given message.
    #[error("{0}")]
    InvalidParams(String),
}

impl CommandError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        CommandError::InvalidParams(message.into())
    }
}

impl Default for CommandError {
    fn default() -> Self {
        CommandError::InvalidParams("Invalid parameters".into())
    }
}

impl From<CommandError> for ChatopsError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::InvalidParams(msg) => ChatopsError::InvalidParams(msg),
        }
    }
}
