use std::time::Duration;

use axum::extract::State;
use axum::Json;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use chrono::Utc;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::time::Instant;

use gather_core::serde::to_rfc3339_ms;

use crate::error::TicketingError;
use crate::state::AppState;
use crate::worker::BatchSummary;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
pub struct ProcessRemindersResponse {
    pub success: bool,
    pub message: String,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub timestamp: chrono::DateTime<Utc>,
}

/// `GET /workers/process-reminders`: drain due notification jobs for a bounded window.
pub async fn process_reminders(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<ProcessRemindersResponse>, TicketingError> {
    let token = auth.as_ref().map(|TypedHeader(a)| a.token()).unwrap_or("");
    if !token_matches(token, &state.config.worker_bearer_token) {
        return Err(TicketingError::Unauthorized);
    }

    let window = Duration::from_secs(state.config.worker_window_secs);
    let summary = state
        .worker(state.config.worker_concurrency, POLL_INTERVAL)
        .run_until(Instant::now() + window)
        .await;

    Ok(Json(ProcessRemindersResponse {
        success: true,
        message: summary_message(&summary),
        timestamp: Utc::now(),
    }))
}

fn token_matches(given: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}

fn summary_message(summary: &BatchSummary) -> String {
    format!(
        "processed {} jobs ({} succeeded, {} skipped, {} failed)",
        summary.processed, summary.succeeded, summary.skipped, summary.failed
    )
}
