//! In-process client for a chatops router.
//!
//! Drives the router the way a chat bot would: fetch the listing, turn chat
//! text into a call, sign it, and read the envelope back. Useful for testing
//! hosts that register their own commands.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    auth::SIGNATURE_STRING_HEADER,
    dispatch::TestingAuth,
    envelope::{Envelope, RpcError, RpcRequest},
    matcher::{ChatMatcher, MatchError},
    registry::Listing,
    signer::RequestSigner,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    NoMatchingCommand(#[from] MatchError),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("There was an error instead of an expected successful response: {0:?}")]
    Unexpected(RpcError),

    #[error("expected an error response, got: {0}")]
    NotAnError(Value),

    #[error("invalid response body: {0}")]
    Body(String),
}

/// How outgoing requests authenticate.
#[derive(Debug, Clone)]
pub enum ClientAuth {
    Signed(RequestSigner),
    /// Mark requests as in-process test traffic. Only works against state
    /// built with testing auth allowed.
    Testing,
    Unsigned,
}

/// A response as seen by the client.
#[derive(Debug, Clone)]
pub struct ChatopResponse {
    pub status: StatusCode,
    pub body: Value,
    /// Decoded `X-Chatops-Signature-String`, if the server sent one.
    pub signing_string: Option<Vec<u8>>,
}

impl ChatopResponse {
    pub fn envelope(&self) -> Result<Envelope, ClientError> {
        serde_json::from_value(self.body.clone()).map_err(|e| ClientError::Body(e.to_string()))
    }

    /// The success result; fails if the envelope carries an error.
    pub fn result(&self) -> Result<String, ClientError> {
        let envelope = self.envelope()?;
        if let Some(error) = envelope.error {
            return Err(ClientError::Unexpected(error));
        }
        envelope
            .result
            .ok_or_else(|| ClientError::Body("envelope has neither result nor error".into()))
    }

    /// The error member; fails if the call succeeded.
    pub fn error(&self) -> Result<RpcError, ClientError> {
        self.envelope()?
            .error
            .ok_or_else(|| ClientError::NotAnError(self.body.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct ChatopsClient {
    router: Router,
    auth: ClientAuth,
    prefix: Option<String>,
    mount: String,
}

impl ChatopsClient {
    pub fn new(router: Router, auth: ClientAuth) -> Self {
        Self {
            router,
            auth,
            prefix: None,
            mount: "/_chatops".into(),
        }
    }

    /// Chat-text prefix the bot expects before every command.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    async fn send(&self, method: Method, path: &str, body: Vec<u8>) -> Result<ChatopResponse, ClientError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let ClientAuth::Signed(signer) = &self.auth {
            builder = signer.sign_now(path, &body).apply(builder);
        }
        let mut request = builder
            .body(Body::from(body))
            .map_err(|e| ClientError::Body(e.to_string()))?;
        if matches!(self.auth, ClientAuth::Testing) {
            request.extensions_mut().insert(TestingAuth);
        }

        let response = match self.router.clone().oneshot(request).await {
            Ok(r) => r,
            Err(never) => match never {},
        };
        let status = response.status();
        let signing_string = response
            .headers()
            .get(SIGNATURE_STRING_HEADER)
            .and_then(|v| STANDARD.decode(v.as_bytes()).ok());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ClientError::Body(e.to_string()))?;
        let body = serde_json::from_slice(&bytes).map_err(|_| ClientError::Status {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })?;
        Ok(ChatopResponse {
            status,
            body,
            signing_string,
        })
    }

    /// `GET /_chatops`.
    pub async fn list(&self) -> Result<Listing, ClientError> {
        let response = self.send(Method::GET, &self.mount, Vec::new()).await?;
        if response.status != StatusCode::OK {
            return Err(ClientError::Status {
                status: response.status,
                body: response.body.to_string(),
            });
        }
        serde_json::from_value(response.body).map_err(|e| ClientError::Body(e.to_string()))
    }

    /// Call a command by name with structured parameters.
    pub async fn chatop(
        &self,
        method: &str,
        params: HashMap<String, String>,
        user: Option<&str>,
        room: Option<&str>,
    ) -> Result<ChatopResponse, ClientError> {
        let request = RpcRequest {
            id: Value::Null,
            method: Some(method.to_string()),
            user: user.map(str::to_string),
            room_id: room.map(Value::from).unwrap_or_default(),
            params,
        };
        let body = serde_json::to_vec(&request).map_err(|e| ClientError::Body(e.to_string()))?;
        let path = format!("{}/{method}", self.mount);
        self.send(Method::POST, &path, body).await
    }

    /// Resolve chat text against the server's listing, then call the
    /// matching command.
    pub async fn chat(&self, message: &str, user: &str, room: &str) -> Result<ChatopResponse, ClientError> {
        let listing = self.list().await?;
        let matcher = ChatMatcher::from_listing(&listing, self.prefix.as_deref())?;
        let invocation = matcher.resolve(message, Some(user), Some(room))?;
        self.chatop(&invocation.command, invocation.params, Some(user), Some(room))
            .await
    }
}
