use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use crate::state::AppState;

/// `GET /readyz`: ready once PostgreSQL answers.
///
/// Redis is left out; the checkout rate limiter lets requests through while it is down.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    match state.db.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "database not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
