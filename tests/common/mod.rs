//! Shared helpers for relay integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rsa::RsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use serde_json::{Value, json};
use sha1::Sha1;
use travis_discord_relay::signature::TravisPublicKey;
use travis_discord_relay::{AppState, RelayConfig, build_router};

pub const PUBLIC_KEY_PEM: &str = include_str!("../fixtures/public_key.pem");
pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const WEBHOOK_PATH: &str = "/api/webhooks/1/token";

pub const PASSED_COLOR: u32 = 3779158;
pub const PENDING_COLOR: u32 = 15588927;
pub const FAILED_COLOR: u32 = 14370117;

/// Relay configuration pointing at a mock Discord server.
pub fn config(discord_base: &str, signature_enabled: bool) -> RelayConfig {
    RelayConfig::from_toml_str(&format!(
        r#"
discord_webhook = "{discord_base}{WEBHOOK_PATH}"
authorized_owners = ["octocat"]

[colors]
passed = {PASSED_COLOR}
pending = {PENDING_COLOR}
failed = {FAILED_COLOR}

[signature]
enabled = {signature_enabled}
"#
    ))
    .expect("test config should parse")
}

pub fn router(config: RelayConfig) -> Router {
    let public_key = config
        .signature
        .enabled
        .then(|| TravisPublicKey::from_pem(PUBLIC_KEY_PEM).expect("fixture key should parse"));
    let state = AppState::new(config, public_key, reqwest::Client::new())
        .expect("test state should build");
    build_router(Arc::new(state))
}

pub fn notification() -> Value {
    json!({
        "id": 1,
        "number": "42",
        "status_message": "Passed",
        "repository": {"id": 7, "owner_name": "octocat", "name": "hello-world"},
        "commit": "62aae5f70ceee39123ef",
        "branch": "main",
        "compare_url": "https://github.com/octocat/hello-world/compare/a...b",
        "pull_request": false,
        "pull_request_number": null,
        "message": "Fix bug\nSecond line\nThird line",
        "build_url": "https://travis-ci.org/octocat/hello-world/builds/1",
        "started_at": "2024-05-01T10:00:00Z",
        "finished_at": "2024-05-01T10:05:00Z"
    })
}

pub fn form_body(payload: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("payload", payload)
        .finish()
}

pub fn sign(payload: &str) -> String {
    let private_key = RsaPrivateKey::from_pkcs8_pem(SIGNING_KEY_PEM).expect("fixture key");
    let signing_key = SigningKey::<Sha1>::new(private_key);
    STANDARD.encode(signing_key.sign(payload.as_bytes()).to_bytes())
}

pub fn notify_request(uri: &str, payload: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(signature) = signature {
        builder = builder.header("Signature", signature);
    }
    builder
        .body(Body::from(form_body(payload)))
        .expect("request should build")
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    String::from_utf8(bytes.to_vec()).expect("response body should be UTF-8")
}
