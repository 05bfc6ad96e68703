use crate::http::types::{HttpError, HttpResult, HttpSuccess, SetLogLevelRequest};
use crate::http::HttpState;
use crate::line::signature::{verify_signature, SIGNATURE_HEADER};
use crate::line::extract_events;
use crate::line::types::WebhookPayload;
use crate::relay::Outcome;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use futures::{stream, StreamExt};
use std::str::FromStr;
use tracing::log::{debug, info, warn};
use tracing::{info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Body LINE receives for every verified delivery.
pub const ACKNOWLEDGEMENT: &str = "OK";

/// Events of one delivery processed at the same time. Each has its own reply
/// token, so the order replies go out in doesn't matter.
const EVENT_CONCURRENCY: usize = 4;

pub async fn callback(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, HttpError> {
    let request_id = Uuid::new_v4();
    async move {
        debug!("Received webhook delivery ({} bytes)", body.len());

        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        if let Err(e) = verify_signature(&state.channel_secret, &body, signature) {
            warn!("Rejecting webhook delivery: {e}");
            return Err(HttpError::from(e));
        }
        debug!("Webhook signature verified");

        let payload = match WebhookPayload::parse(&body) {
            Ok(payload) => payload,
            Err(e) => {
                // LINE only needs to know the delivery arrived.
                warn!("{e}");
                return Ok(ACKNOWLEDGEMENT);
            }
        };

        if let Some(destination) = &payload.destination {
            debug!("Delivery is addressed to {destination}");
        }

        let relay = &state.relay;
        let outcomes: Vec<Outcome> = stream::iter(extract_events(payload))
            .map(move |event| relay.handle(event))
            .buffer_unordered(EVENT_CONCURRENCY)
            .collect()
            .await;

        let replied = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Outcome::Replied { .. } | Outcome::RepliedWithFallback { .. }))
            .count();
        info!(
            "Processed {} message event(s), {replied} replied",
            outcomes.len()
        );
        for outcome in &outcomes {
            debug!("Event outcome: {outcome:?}");
        }

        Ok(ACKNOWLEDGEMENT)
    }
    .instrument(info_span!("callback", %request_id))
    .await
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn sys_version(State(_state): State<HttpState>) -> HttpResult<String> {
    Ok(HttpSuccess(crate::VERSION.to_string()))
}

pub async fn sys_set_log_level(
    State(state): State<HttpState>,
    Json(payload): Json<SetLogLevelRequest>,
) -> HttpResult<bool> {
    let filter = EnvFilter::from_str(&payload.level).map_err(|e| HttpError {
        status: StatusCode::BAD_REQUEST,
        message: e.to_string(),
    })?;

    let reload = state.tracing_reload.as_ref().ok_or_else(|| HttpError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: "Log level reloading is not available".to_string(),
    })?;

    info!("Setting log level to {filter} via API");
    let success = reload
        .reload(filter)
        .map(|_| true)
        .map_err(|e| HttpError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        })?;

    Ok(HttpSuccess(success))
}
