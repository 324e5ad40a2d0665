//! Router-level tests: authentication, dispatch and the envelope protocol.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chatops_rpc::{
    auth::{Authenticator, NONCE_HEADER, SIGNATURE_HEADER, SIGNATURE_STRING_HEADER},
    client::{ChatopsClient, ClientAuth},
    signer::SignedHeaders,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::{
    authenticator, echo_registry, key, registry, router, router_with, signer, BASE_URL,
};

async fn send(
    app: Router,
    method: &str,
    path: &str,
    signed: Option<SignedHeaders>,
    body: &str,
) -> (StatusCode, Value, HeaderMap) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(h) = signed {
        builder = h.apply(builder);
    }
    let response = app
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, headers)
}

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn client() -> ChatopsClient {
    ChatopsClient::new(router(), ClientAuth::Signed(signer(0)))
}

// ── Authentication ────────────────────────────────────────────────────────────

#[tokio::test]
async fn requires_authentication() {
    let (status, body, _) = send(router(), "GET", "/_chatops", None, "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], -32801);
}

#[tokio::test]
async fn allows_authentication() {
    let headers = signer(0).sign_now("/_chatops", b"");
    let (status, body, resp_headers) = send(router(), "GET", "/_chatops", Some(headers.clone()), "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["namespace"], "test");

    let echoed = STANDARD
        .decode(resp_headers[SIGNATURE_STRING_HEADER].as_bytes())
        .unwrap();
    let expected = format!("{BASE_URL}/_chatops\n{}\n{}\n", headers.nonce, headers.timestamp);
    assert_eq!(String::from_utf8(echoed).unwrap(), expected);
}

#[tokio::test]
async fn allows_authentication_from_alternate_key() {
    let headers = signer(1).sign_now("/_chatops", b"");
    let (status, _, _) = send(router(), "GET", "/_chatops", Some(headers), "").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rejects_untrusted_key() {
    let headers = signer(2).sign_now("/_chatops", b"");
    let (status, body, resp_headers) = send(router(), "GET", "/_chatops", Some(headers), "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32800, "message": "Not authorized" }
        })
    );
    assert!(resp_headers.contains_key(SIGNATURE_STRING_HEADER));
}

#[tokio::test]
async fn rejects_tampered_body() {
    let signed_body = r#"{"user":"foo","params":{"app":"foo"}}"#;
    let sent_body = r#"{"user":"foo","params":{"app":"bar"}}"#;
    let headers = signer(0).sign_now("/_chatops/wcid", signed_body.as_bytes());
    let (status, body, _) = send(router(), "POST", "/_chatops/wcid", Some(headers), sent_body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], -32800);
}

#[tokio::test]
async fn rejects_signature_for_another_path() {
    let headers = signer(0).sign_now("/_chatops/foobar", b"");
    let (status, body, _) = send(router(), "POST", "/_chatops/wcid", Some(headers), "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], -32800);
}

#[tokio::test]
async fn rejects_stale_and_future_timestamps_even_when_signed() {
    for offset in [-61, -300, 61, 300] {
        let ts = (Utc::now() + Duration::seconds(offset)).to_rfc3339_opts(SecondsFormat::Secs, true);
        let headers = signer(0).sign("/_chatops", "nonce", &ts, b"");
        let (status, body, _) = send(router(), "GET", "/_chatops", Some(headers), "").await;
        assert_eq!(status, StatusCode::FORBIDDEN, "offset {offset}");
        assert_eq!(body["error"]["code"], -32803, "offset {offset}");
    }
}

#[tokio::test]
async fn rejects_unparseable_timestamp() {
    let headers = signer(0).sign("/_chatops", "nonce", "around lunchtime", b"");
    let (status, body, _) = send(router(), "GET", "/_chatops", Some(headers), "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], -32804);
}

#[tokio::test]
async fn rejects_missing_timestamp() {
    let headers = signer(0).sign_now("/_chatops", b"");
    let request = Request::builder()
        .method("GET")
        .uri("/_chatops")
        .header(NONCE_HEADER, &headers.nonce)
        .header(SIGNATURE_HEADER, &headers.signature)
        .body(Body::empty())
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], -32804);
    assert_eq!(body["error"]["message"], "Missing X-Chatops-Timestamp");
}

#[tokio::test]
async fn unsigned_client_is_refused() {
    let client = ChatopsClient::new(router(), ClientAuth::Unsigned);
    let response = client
        .chatop("wcid", params(&[("app", "foo")]), Some("foo"), None)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.error().unwrap().code, -32801);
    assert!(response.signing_string.is_none());
}

#[tokio::test]
async fn signing_string_echo_keeps_non_utf8_body() {
    let body: &[u8] = &[0x7b, 0xff, 0xfe, 0x7d];
    let headers = signer(0).sign_now("/_chatops/wcid", body);
    let request = headers
        .apply(Request::builder().method("POST").uri("/_chatops/wcid"))
        .body(Body::from(body.to_vec()))
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    // Authenticated, then rejected by the body parser.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let echoed = STANDARD
        .decode(response.headers()[SIGNATURE_STRING_HEADER].as_bytes())
        .unwrap();
    assert!(echoed.ends_with(body));
    assert!(echoed.starts_with(format!("{BASE_URL}/_chatops/wcid\n").as_bytes()));
}

#[tokio::test]
async fn rejects_malformed_signature_header() {
    let mut headers = signer(0).sign_now("/_chatops", b"");
    headers.signature = "Signature keyid=hubot".into();
    let (status, body, resp_headers) = send(router(), "GET", "/_chatops", Some(headers), "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], -32802);
    assert!(!resp_headers.contains_key(SIGNATURE_STRING_HEADER));
}

#[tokio::test]
async fn missing_primary_key_is_a_configuration_error() {
    let auth = Authenticator::new(Some(BASE_URL.into()), None, Some(key(1).to_public_key()));
    let app = router_with(registry(), auth, false);
    let headers = signer(1).sign_now("/_chatops", b"");
    let (status, body, _) = send(app, "GET", "/_chatops", Some(headers), "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("CHATOPS_AUTH_PUBLIC_KEY"));
    assert!(body.get("jsonrpc").is_none());
}

#[tokio::test]
async fn missing_base_url_is_a_configuration_error() {
    let auth = Authenticator::new(None, Some(key(0).to_public_key()), None);
    let app = router_with(registry(), auth, false);
    let headers = signer(0).sign_now("/_chatops", b"");
    let (status, body, _) = send(app, "GET", "/_chatops", Some(headers), "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("CHATOPS_AUTH_BASE_URL"));
}

#[tokio::test]
async fn does_not_add_authentication_to_non_chatops_routes() {
    let (status, body, _) = send(router(), "GET", "/health", None, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn testing_auth_only_when_allowed() {
    let blocked = ChatopsClient::new(router(), ClientAuth::Testing);
    assert!(blocked.list().await.is_err());

    let allowed = ChatopsClient::new(
        router_with(registry(), authenticator(), true),
        ClientAuth::Testing,
    );
    assert_eq!(allowed.list().await.unwrap().namespace, "test");
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn provides_a_list_method() {
    let listing = serde_json::to_value(client().list().await.unwrap()).unwrap();
    assert_eq!(
        listing,
        json!({
            "namespace": "test",
            "help": "ChatOps of and relating to testing",
            "error_response": null,
            "methods": {
                "wcid": {
                    "help": "where can i deploy?",
                    "regex": common::WCID,
                    "params": ["app"],
                    "path": "wcid"
                },
                "foobar": {
                    "help": "how to foo and bar",
                    "regex": "(?:how can i foo and bar all at once)?",
                    "params": [],
                    "path": "foobar"
                }
            },
            "version": "3"
        })
    );
}

#[tokio::test]
async fn requires_a_user_be_sent_to_chatops() {
    let response = client().chatop("foobar", HashMap::new(), None, None).await.unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body,
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32602, "message": "A username must be supplied as 'user'" }
        })
    );
}

#[tokio::test]
async fn returns_method_not_found_for_a_not_found_method() {
    let response = client().chatop("barfoo", HashMap::new(), Some("foo"), None).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(
        response.body,
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32601, "message": "Method not found" }
        })
    );
}

#[tokio::test]
async fn runs_a_known_method() {
    let response = client().chatop("foobar", HashMap::new(), Some("foo"), None).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body,
        json!({
            "jsonrpc": "2.0",
            "id": null,
            "result": "You just foo and bar like it just don't matter"
        })
    );
}

#[tokio::test]
async fn passes_parameters_to_methods() {
    let response = client()
        .chatop("wcid", params(&[("app", "foo")]), Some("foo"), None)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.result().unwrap(), "You can deploy foo just fine.");
}

#[tokio::test]
async fn handler_pre_checks_return_invalid_params() {
    let response = client().chatop("wcid", HashMap::new(), Some("foo"), None).await.unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let error = response.error().unwrap();
    assert_eq!(error.code, -32602);
    assert_eq!(error.message, "I need an app, every time");
}

#[tokio::test]
async fn allows_methods_to_return_invalid_params_with_a_message() {
    let response = client()
        .chatop("wcid", params(&[("app", "nope")]), Some("foo"), None)
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error().unwrap().message, "I need nope, sorry");
    assert!(response.result().is_err());
}

#[tokio::test]
async fn echoes_request_id() {
    let body = r#"{"id":"abc-123","user":"foo","params":{"app":"foo"}}"#;
    let headers = signer(0).sign_now("/_chatops/wcid", body.as_bytes());
    let (status, json, _) = send(router(), "POST", "/_chatops/wcid", Some(headers), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "abc-123");
    assert_eq!(json["result"], "You can deploy foo just fine.");
}

#[tokio::test]
async fn method_may_be_named_in_the_body() {
    let body = r#"{"id":5,"method":"wcid","user":"foo","params":{"app":"web"}}"#;
    let headers = signer(0).sign_now("/_chatops", body.as_bytes());
    let (status, json, _) = send(router(), "POST", "/_chatops", Some(headers), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 5);
    assert_eq!(json["result"], "You can deploy web just fine.");
}

#[tokio::test]
async fn unparseable_body_is_a_parse_error() {
    let body = "{not json";
    let headers = signer(0).sign_now("/_chatops/wcid", body.as_bytes());
    let (status, json, _) = send(router(), "POST", "/_chatops/wcid", Some(headers), body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], -32700);
}

#[tokio::test]
async fn non_string_params_are_an_invalid_request() {
    let body = r#"{"id":9,"user":"foo","params":{"app":42}}"#;
    let headers = signer(0).sign_now("/_chatops/wcid", body.as_bytes());
    let (status, json, _) = send(router(), "POST", "/_chatops/wcid", Some(headers), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], -32600);
    assert_eq!(json["id"], 9);
}

#[tokio::test]
async fn room_id_is_opaque() {
    let app = router_with(echo_registry(), authenticator(), false);
    let body = r#"{"user":"foo","room_id":123,"params":{}}"#;
    let headers = signer(0).sign_now("/_chatops/whereami", body.as_bytes());
    let (status, json, _) = send(app, "POST", "/_chatops/whereami", Some(headers), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "123");
}

#[tokio::test]
async fn null_params_are_empty() {
    let body = r#"{"user":"foo","params":null}"#;
    let headers = signer(0).sign_now("/_chatops/foobar", body.as_bytes());
    let (status, json, _) = send(router(), "POST", "/_chatops/foobar", Some(headers), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], "You just foo and bar like it just don't matter");
}
