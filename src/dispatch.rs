//! Request dispatch.
//!
//! A call moves through a fixed sequence of gates:
//!
//! 1. authenticate, when the name is a command or `list`
//! 2. parse the body
//! 3. require a caller, when the name is a command
//! 4. resolve the name, unknown names are `Method not found`
//! 5. invoke the handler and wrap its outcome in an envelope
//!
//! Each gate fails with exactly one [`ChatopsError`] and ends the request.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use crate::{
    envelope::{Reply, RpcRequest},
    error::ChatopsError,
    matcher::MatchError,
    registry::{Invocation, LIST},
    state::AppState,
};

/// Request extension marking in-process test traffic. It cannot arrive over
/// the wire, and is only honoured when [`AppState::allow_testing_auth`] is set.
#[derive(Debug, Clone, Copy)]
pub struct TestingAuth;

/// An inbound HTTP call as the router hands it over.
#[derive(Debug)]
pub struct Inbound<'a> {
    /// Command name from the route, if the route carries one.
    pub name: Option<&'a str>,
    /// Request path, signed together with the base URL.
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    /// Exact bytes received.
    pub body: &'a [u8],
    pub testing: bool,
}

const MISSING_USER: &str = "A username must be supplied as 'user'";

/// Run an HTTP call through every gate.
pub async fn dispatch(state: &AppState, inbound: Inbound<'_>, now: DateTime<Utc>) -> Reply {
    let (id, body_method) = RpcRequest::peek(inbound.body);
    let name = inbound.name.map(str::to_string).or(body_method);
    let name = name.unwrap_or_default();

    let mut signing_string = None;
    if state.registry.is_operation(&name) {
        if inbound.testing && state.allow_testing_auth {
            tracing::debug!(operation = %name, "testing auth, skipping signature check");
        } else {
            let outcome = state
                .auth
                .authenticate(inbound.path, inbound.headers, inbound.body, now);
            signing_string = outcome.signing_string;
            match outcome.result {
                Ok(key_id) => {
                    tracing::debug!(operation = %name, key_id = ?key_id, "chatops request authenticated");
                }
                Err(e) => {
                    if !e.is_configuration() {
                        tracing::warn!(operation = %name, "chatops authentication failed: {e}");
                    }
                    return Reply::error(id, e).with_signing_string(signing_string);
                }
            }
        }
    }

    let request = match RpcRequest::parse(inbound.body) {
        Ok(r) => r,
        Err(e) => return Reply::error(id, e).with_signing_string(signing_string),
    };

    if name == LIST {
        let listing = state.registry.list();
        return match serde_json::to_value(listing) {
            Ok(v) => Reply::json(v),
            Err(e) => Reply::error(id, ChatopsError::InvalidRequest(e.to_string())),
        }
        .with_signing_string(signing_string);
    }

    let room = request.room();
    let invocation = Invocation {
        command: name,
        caller: request.user.filter(|u| !u.is_empty()),
        room,
        params: request.params,
        request_id: request.id,
    };
    invoke(state, invocation).await.with_signing_string(signing_string)
}

/// Run an already-resolved invocation: caller gate, lookup, handler.
pub async fn invoke(state: &AppState, invocation: Invocation) -> Reply {
    let id = invocation.request_id.clone();

    let Some(command) = state.registry.lookup(&invocation.command) else {
        tracing::debug!(command = %invocation.command, "unknown chatop");
        return Reply::error(id, ChatopsError::MethodNotFound);
    };

    if invocation.caller.is_none() {
        return Reply::error(id, ChatopsError::InvalidParams(MISSING_USER.into()));
    }

    tracing::info!(
        command = %command.name,
        user = invocation.caller.as_deref().unwrap_or_default(),
        room = invocation.room.as_deref().unwrap_or_default(),
        "running chatop"
    );

    match command.invoke(invocation).await {
        Ok(result) => Reply::ok(id, result),
        Err(e) => Reply::error(id, e.into()),
    }
}

/// Resolve chat text against the registry without a round trip.
pub fn resolve_chat(
    state: &AppState,
    text: &str,
    caller: &str,
    room: Option<&str>,
) -> Result<Invocation, MatchError> {
    state.matcher.resolve(text, Some(caller), room)
}
