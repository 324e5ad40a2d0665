//! Client half of request authentication: sign outbound chatops calls.

use axum::http::request::Builder;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{SecondsFormat, Utc};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use sha2::Sha256;

use crate::auth::{signing_message, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};

/// The three authentication header values for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub nonce: String,
    pub timestamp: String,
    /// Full `Signature keyid=...,signature=...` value.
    pub signature: String,
}

impl SignedHeaders {
    pub fn apply(&self, builder: Builder) -> Builder {
        builder
            .header(NONCE_HEADER, &self.nonce)
            .header(TIMESTAMP_HEADER, &self.timestamp)
            .header(SIGNATURE_HEADER, &self.signature)
    }
}

#[derive(Clone)]
pub struct RequestSigner {
    key: SigningKey<Sha256>,
    key_id: String,
    base_url: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("key_id", &self.key_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(private_key: RsaPrivateKey, key_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            key: SigningKey::<Sha256>::new(private_key),
            key_id: key_id.into(),
            base_url: base_url.into(),
        }
    }

    /// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`).
    pub fn from_pem(pem: &str, key_id: impl Into<String>, base_url: impl Into<String>) -> Result<Self, String> {
        let pem = pem.trim();
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| format!("invalid RSA private key: {e}"))?;
        Ok(Self::new(key, key_id, base_url))
    }

    /// Sign with an explicit nonce and timestamp.
    pub fn sign(&self, path: &str, nonce: &str, timestamp: &str, body: &[u8]) -> SignedHeaders {
        let url = format!("{}{path}", self.base_url);
        let message = signing_message(&url, nonce, timestamp, body);
        let signature = STANDARD.encode(self.key.sign(&message).to_vec());
        SignedHeaders {
            nonce: nonce.to_string(),
            timestamp: timestamp.to_string(),
            signature: format!("Signature keyid={},signature={signature}", self.key_id),
        }
    }

    /// Sign with a fresh random nonce and the current time.
    pub fn sign_now(&self, path: &str, body: &[u8]) -> SignedHeaders {
        let nonce = uuid::Uuid::new_v4().to_string();
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.sign(path, &nonce, &timestamp, body)
    }
}
