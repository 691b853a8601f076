use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::domain::types::ProcessorEvent;
use crate::error::TicketingError;
use crate::infra::signature::{SIGNATURE_HEADER, verify_signature};
use crate::state::AppState;

/// `POST /webhooks/payment`. Errors other than 400 make the processor redeliver.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, TicketingError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(reason) = verify_signature(
        &body,
        signature,
        state.config.payment_webhook_secret.as_deref(),
        Utc::now().timestamp(),
    ) {
        warn!(reason = %reason, "rejected payment webhook");
        return Err(TicketingError::InvalidSignature);
    }

    let event = ProcessorEvent::parse(&body).map_err(|e| {
        warn!(error = %e, "undecodable payment webhook");
        TicketingError::InvalidPayload
    })?;
    state.reconcile_usecase().handle(event).await?;
    Ok(Json(json!({ "received": true })))
}
