// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>
// Patent Pending — DE Gebrauchsmuster, filed 2026-02-23

//! RSA signature verification for chatops requests.
//!
//! Every authenticated request carries three headers:
//!
//! - `X-Chatops-Nonce`: opaque token, must be non-empty
//! - `X-Chatops-Timestamp`: ISO-8601 time, must be within ±60s of server time
//! - `X-Chatops-Signature`: `Signature keyid=<id>,signature=<base64>`
//!
//! ## Canonical message format
//!
//! The message the client signs (RSASSA-PKCS1-v1_5, SHA-256) is:
//! ```text
//! {base_url}{path}\n{nonce}\n{timestamp}\n{raw_body}
//! ```
//!
//! Fields are taken verbatim. The body is the exact bytes received; a
//! re-serialised body will not verify.
//!
//! The nonce is required but not remembered, so a captured request replays
//! for as long as its timestamp stays inside the window.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use rsa::{
    pkcs1::DecodeRsaPublicKey,
    pkcs1v15::{Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
    signature::Verifier,
    RsaPublicKey,
};
use sha2::Sha256;

use crate::error::ChatopsError;

pub const NONCE_HEADER: &str = "x-chatops-nonce";
pub const TIMESTAMP_HEADER: &str = "x-chatops-timestamp";
pub const SIGNATURE_HEADER: &str = "x-chatops-signature";
/// Base64 of the canonical string, returned to help clients debug mismatches.
pub const SIGNATURE_STRING_HEADER: &str = "x-chatops-signature-string";

/// Accepted clock skew, both directions, inclusive.
pub const TIMESTAMP_WINDOW_SECS: i64 = 60;

/// Build the canonical message for a request.
pub fn signing_message(url: &str, nonce: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(url.len() + nonce.len() + timestamp.len() + body.len() + 3);
    message.extend_from_slice(url.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(nonce.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b'\n');
    message.extend_from_slice(body);
    message
}

/// Parse an RSA public key from PEM. Both SPKI (`BEGIN PUBLIC KEY`) and
/// PKCS#1 (`BEGIN RSA PUBLIC KEY`) encodings are accepted.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, String> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| format!("invalid RSA public key: {e}"))
}

/// Verify a PKCS#1 v1.5 / SHA-256 signature. Never errors; a wrong or
/// malformed signature is simply `false`.
pub fn verify_signature(key: &RsaPublicKey, signature: &[u8], message: &[u8]) -> bool {
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(key.clone())
        .verify(message, &signature)
        .is_ok()
}

/// [`verify_signature`] against a PEM key; an unparseable key is `false`.
pub fn verify_pem(public_key_pem: &str, signature: &[u8], message: &[u8]) -> bool {
    parse_public_key(public_key_pem)
        .map(|key| verify_signature(&key, signature, message))
        .unwrap_or(false)
}

/// Fields of a `Signature keyid=...,signature=...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub key_id: Option<String>,
    /// Still base64-encoded.
    pub signature: String,
}

/// Parse the signature header. `None` when there is no non-empty
/// `signature=` field after the scheme word.
pub fn parse_signature_header(raw: &str) -> Option<SignatureHeader> {
    let (_scheme, items) = raw.split_once(' ')?;
    let mut key_id = None;
    let mut signature = None;
    for item in items.split(',') {
        let Some((name, value)) = item.split_once('=') else {
            continue;
        };
        match name {
            "keyid" => key_id = Some(value.to_string()),
            "signature" => signature = Some(value.to_string()),
            _ => {}
        }
    }
    let signature = signature.filter(|s| !s.is_empty())?;
    Some(SignatureHeader { key_id, signature })
}

/// Parse a timestamp header and check it against the window around `now`.
pub fn check_timestamp(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ChatopsError> {
    let time = DateTime::parse_from_rfc3339(raw.trim())
        .or_else(|_| DateTime::parse_from_rfc2822(raw.trim()))
        .map_err(|_| ChatopsError::InvalidTimestamp(raw.to_string()))?
        .with_timezone(&Utc);

    let window = Duration::seconds(TIMESTAMP_WINDOW_SECS);
    if time < now - window || time > now + window {
        return Err(ChatopsError::TimestampOutOfWindow(raw.to_string()));
    }
    Ok(time)
}

/// Result of running the authentication gate.
#[derive(Debug)]
pub struct AuthOutcome {
    /// Set once the canonical string has been computed, success or failure.
    pub signing_string: Option<Vec<u8>>,
    pub result: Result<Option<String>, ChatopsError>,
}

impl AuthOutcome {
    fn rejected(err: ChatopsError) -> Self {
        Self {
            signing_string: None,
            result: Err(err),
        }
    }
}

/// Server-side key material: a primary key, an optional alternate for
/// rotation, and the base URL requests are signed against.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    pub base_url: Option<String>,
    pub primary: Option<RsaPublicKey>,
    pub alternate: Option<RsaPublicKey>,
}

impl Authenticator {
    pub fn new(
        base_url: Option<String>,
        primary: Option<RsaPublicKey>,
        alternate: Option<RsaPublicKey>,
    ) -> Self {
        Self {
            base_url,
            primary,
            alternate,
        }
    }

    /// Fail when the deployment cannot authenticate anyone.
    fn check_configuration(&self) -> Result<(&str, &RsaPublicKey), ChatopsError> {
        let base_url = self.base_url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
            ChatopsError::Configuration(
                "You need to set the server's base URL to authenticate chatops RPC via CHATOPS_AUTH_BASE_URL".into(),
            )
        })?;
        if base_url.ends_with('/') {
            return Err(ChatopsError::Configuration(format!(
                "CHATOPS_AUTH_BASE_URL must not end in '/': {base_url}"
            )));
        }
        let primary = self.primary.as_ref().ok_or_else(|| {
            ChatopsError::Configuration(
                "You need to add a client's public key in .pem format via CHATOPS_AUTH_PUBLIC_KEY".into(),
            )
        })?;
        Ok((base_url, primary))
    }

    /// Run every precondition and verify the signature against the primary
    /// key, then the alternate. On success yields the header's `keyid`.
    pub fn authenticate(
        &self,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> AuthOutcome {
        let (base_url, primary) = match self.check_configuration() {
            Ok(c) => c,
            Err(e) => return AuthOutcome::rejected(e),
        };

        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        let Some(nonce) = header(NONCE_HEADER).filter(|n| !n.is_empty()) else {
            return AuthOutcome::rejected(ChatopsError::MissingNonce);
        };

        let Some(timestamp) = header(TIMESTAMP_HEADER) else {
            return AuthOutcome::rejected(ChatopsError::MissingTimestamp);
        };
        if let Err(e) = check_timestamp(timestamp, now) {
            return AuthOutcome::rejected(e);
        }

        let Some(parsed) = header(SIGNATURE_HEADER).and_then(parse_signature_header) else {
            return AuthOutcome::rejected(ChatopsError::MalformedSignatureHeader);
        };

        let url = format!("{base_url}{path}");
        let message = signing_message(&url, nonce, timestamp, body);
        let verified = match STANDARD.decode(parsed.signature.trim()) {
            Ok(sig) => {
                verify_signature(primary, &sig, &message)
                    || self
                        .alternate
                        .as_ref()
                        .is_some_and(|alt| verify_signature(alt, &sig, &message))
            }
            Err(_) => false,
        };

        let result = if verified {
            Ok(parsed.key_id)
        } else {
            Err(ChatopsError::SignatureMismatch)
        };
        AuthOutcome {
            signing_string: Some(message),
            result,
        }
    }
}
