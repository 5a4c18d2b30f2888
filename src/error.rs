use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use maud::{DOCTYPE, Markup, html};
use std::error::Error as _;
use std::io;
use tracing::{error, warn};

/// Custom error type for travis_discord_relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Repository owner '{owner}' is not authorized")]
    Unauthorized { owner: String },

    #[error("Signature verification failed: {0}")]
    InvalidSignature(String),

    #[error("Notification payload is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Notification field '{field}' is not an RFC 3339 timestamp: {source}")]
    InvalidTimestamp {
        field: &'static str,
        source: chrono::ParseError,
    },

    #[error("Invalid notification payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Invalid form body: {0}")]
    InvalidForm(#[from] FormRejection),

    #[error("No color configured for status '{0}'")]
    UnmappedStatus(String),

    #[error("Forwarding to Discord failed: {0}")]
    Forward(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to fetch Travis public key: {0}")]
    KeyFetch(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Helper type for Results that use RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Authorization and authentication failures answer 401 with no body.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::Unauthorized { .. } | RelayError::InvalidSignature(_)
        )
    }

    /// The error message followed by every source in its chain.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if self.is_rejection() {
            warn!("Rejected notification: {}", self);
            return StatusCode::UNAUTHORIZED.into_response();
        }

        error!(error = ?self, "Failed to relay notification:\n{}", self.chain());
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(server_error_page(&self).into_string()),
        )
            .into_response()
    }
}

/// Fixed HTML page returned for any fault that is not a 401.
pub fn server_error_page(err: &RelayError) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head { title { "Relay error" } }
            body {
                p { "Something went wrong while relaying this notification :/" }
                pre { (err) }
                p { "Sorry about that." }
            }
        }
    }
}
