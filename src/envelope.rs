//! Wire models: the inbound JSON-RPC request and the outbound envelope.

use std::collections::HashMap;

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{auth::SIGNATURE_STRING_HEADER, error::ChatopsError};

/// Request body for `POST /_chatops[/:chatop]`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Echoed back verbatim.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub id: Value,
    /// Command name when it is not given in the path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Opaque; any JSON value is carried through.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub room_id: Value,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: HashMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

impl RpcRequest {
    /// Parse a raw body. Empty bodies are an empty request.
    pub fn parse(body: &[u8]) -> Result<Self, ChatopsError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(body).map_err(|_| ChatopsError::Parse)?;
        if !value.is_object() {
            return Err(ChatopsError::InvalidRequest(
                "request body must be a JSON object".into(),
            ));
        }
        serde_json::from_value(value).map_err(|e| ChatopsError::InvalidRequest(e.to_string()))
    }

    /// The room as handlers see it. Strings pass through as-is, other
    /// values in their JSON form.
    pub fn room(&self) -> Option<String> {
        match &self.room_id {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Best-effort `id` and `method` lookup, so that gates running before
    /// the body is fully parsed can still echo the id.
    pub fn peek(body: &[u8]) -> (Value, Option<String>) {
        let Ok(value) = serde_json::from_slice::<Value>(body) else {
            return (Value::Null, None);
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let method = value.get("method").and_then(Value::as_str).map(str::to_string);
        (id, method)
    }
}

/// Error member of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// The fixed success/error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Envelope {
    pub fn success(id: Value, result: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// What a dispatch produces: a body plus the debugging header, if the
/// canonical string was computed.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: ReplyBody,
    /// Canonical string bytes exactly as verified.
    pub signing_string: Option<Vec<u8>>,
}

#[derive(Debug)]
pub enum ReplyBody {
    Envelope(Envelope),
    Json(Value),
    /// Tier-1 failure, rendered outside the envelope protocol.
    Configuration(ChatopsError),
}

impl Reply {
    pub fn ok(id: Value, result: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ReplyBody::Envelope(Envelope::success(id, result)),
            signing_string: None,
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ReplyBody::Json(value),
            signing_string: None,
        }
    }

    pub fn error(id: Value, err: ChatopsError) -> Self {
        let status = err.status();
        let body = match err.code() {
            Some(code) => ReplyBody::Envelope(Envelope::failure(id, code, err.to_string())),
            None => ReplyBody::Configuration(err),
        };
        Self {
            status,
            body,
            signing_string: None,
        }
    }

    pub fn with_signing_string(mut self, signing_string: Option<Vec<u8>>) -> Self {
        self.signing_string = signing_string;
        self
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            ReplyBody::Envelope(envelope) => (self.status, Json(envelope)).into_response(),
            ReplyBody::Json(value) => (self.status, Json(value)).into_response(),
            ReplyBody::Configuration(err) => err.into_response(),
        };
        if let Some(s) = self.signing_string {
            // Raw newlines are not legal in a header value.
            if let Ok(v) = HeaderValue::from_str(&STANDARD.encode(s)) {
                response.headers_mut().insert(SIGNATURE_STRING_HEADER, v);
            }
        }
        response
    }
}
