//! Delivery of Discord messages and passthrough of Discord's answer

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};
use url::Url;

use crate::embed::DiscordMessage;
use crate::error::{RelayError, Result};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. No request timeout is set; the key fetch sets its own.
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| RelayError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Discord's response, replayed to the caller as-is.
#[derive(Debug, Clone)]
pub struct DiscordResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Headers that describe the upstream connection rather than the response.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    *name == header::CONNECTION
        || *name == header::TRANSFER_ENCODING
        || *name == header::TE
        || *name == header::TRAILER
        || *name == header::UPGRADE
        || *name == header::CONTENT_LENGTH
        || *name == header::PROXY_AUTHENTICATE
        || *name == header::PROXY_AUTHORIZATION
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}

impl IntoResponse for DiscordResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        response
    }
}

/// POSTs the message to the Discord webhook. Non-2xx answers are returned,
/// not treated as errors; only transport failures are.
pub async fn forward_to_discord(
    client: &reqwest::Client,
    webhook: &Url,
    message: &DiscordMessage,
) -> Result<DiscordResponse> {
    let response = client
        .post(webhook.clone())
        .header(header::CONTENT_TYPE, "application/json")
        .json(message)
        .send()
        .await?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;

    if status.is_success() {
        info!("Discord accepted notification with {}", status);
    } else {
        warn!(
            "Discord answered {}: {}",
            status,
            String::from_utf8_lossy(&body)
        );
    }

    Ok(DiscordResponse {
        status,
        headers,
        body,
    })
}
