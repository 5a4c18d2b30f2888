use axum::{
    extract::State as AxumState,
    extract::{Form, rejection::FormRejection},
    http::HeaderMap,
};
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::forward::{DiscordResponse, forward_to_discord};
use crate::signature::SIGNATURE_HEADER;
use crate::webhook::{self, Notification, NotifyForm};
use crate::{AppState, SharedState, embed};

pub async fn root() -> &'static str {
    "travis_discord_relay is running"
}

/// Handles a Travis CI notification POST and relays it to Discord.
pub async fn handle_notification(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    form: std::result::Result<Form<NotifyForm>, FormRejection>,
) -> Result<DiscordResponse> {
    let request_id = Uuid::now_v7();
    let Form(form) = form?;
    relay(&state, &headers, form)
        .instrument(info_span!("notification", %request_id))
        .await
}

async fn relay(state: &AppState, headers: &HeaderMap, form: NotifyForm) -> Result<DiscordResponse> {
    let document = webhook::decode_payload(&form.payload)?;

    let owner = webhook::owner_name(&document)?;
    if !state.config.is_authorized(owner) {
        return Err(RelayError::Unauthorized {
            owner: owner.to_string(),
        });
    }

    if let Some(public_key) = &state.public_key {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                RelayError::InvalidSignature(format!("no {} header supplied", SIGNATURE_HEADER))
            })?;
        public_key.verify(form.payload.as_bytes(), signature)?;
        debug!("Signature verified");
    }

    let notification = Notification::from_document(document)?;
    let presentation = embed::present(&notification.status_message, &state.config)?;
    let message = embed::build_message(&notification, &presentation, state.config.branch_style)?;

    info!(
        "Relaying build #{} of {} ({}) on branch '{}'",
        notification.number,
        notification.slug(),
        notification.status(),
        notification.branch
    );

    forward_to_discord(&state.http, &state.config.discord_webhook, &message).await
}
