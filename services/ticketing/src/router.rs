use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use gather_core::health::healthz;
use gather_core::middleware::{propagate_request_id_layer, request_id_layer};

use crate::handlers::{
    checkout::{create_guest_session, create_session},
    health::readyz,
    webhook::payment_webhook,
    worker::process_reminders,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Checkout
        .route("/checkout/create-session", post(create_session))
        .route("/checkout/create-guest-session", post(create_guest_session))
        // Processor webhooks
        .route("/webhooks/payment", post(payment_webhook))
        // Notification worker
        .route("/workers/process-reminders", get(process_reminders))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id_layer())
        .layer(request_id_layer())
        .with_state(state)
}
