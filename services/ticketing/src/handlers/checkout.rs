use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use gather_auth_types::identity::IdentityHeaders;
use gather_domain::id::{EventId, TicketId, UserId};

use crate::domain::repository::RateLimiter;
use crate::domain::types::Buyer;
use crate::error::TicketingError;
use crate::state::AppState;
use crate::usecase::checkout::CheckoutInput;
use crate::usecase::eligibility::{normalise_email, validate_quantity};

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const ANONYMOUS: &str = "anonymous";

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub event_id: Uuid,
    pub ticket_uuid: Uuid,
    pub quantity: i64,
    #[serde(default)]
    pub guest_name: Option<String>,
    #[serde(default)]
    pub guest_email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub success: bool,
    pub session_id: String,
    pub session_url: String,
}

/// `POST /checkout/create-session` for a signed-in buyer.
pub async fn create_session(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<CreateSessionResponse>, TicketingError> {
    let Json(body) = body.map_err(|_| TicketingError::InvalidRequest("invalid request body"))?;
    let quantity = parse_quantity(body.quantity)?;
    let user_id = UserId(identity.user_id);

    enforce_rate_limit(&state, &user_id.to_string()).await?;
    checkout(
        &state,
        CheckoutInput {
            event_id: EventId(body.event_id),
            ticket_id: TicketId(body.ticket_uuid),
            quantity,
            buyer: Buyer::Member(user_id),
        },
    )
    .await
}

/// `POST /checkout/create-guest-session` for a buyer without an account.
pub async fn create_guest_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<CreateSessionResponse>, TicketingError> {
    let Json(body) = body.map_err(|_| TicketingError::InvalidRequest("invalid request body"))?;
    let quantity = parse_quantity(body.quantity)?;
    let buyer = guest_buyer(body.guest_name.as_deref(), body.guest_email.as_deref())?;

    enforce_rate_limit(&state, &guest_identifier(&headers)).await?;
    checkout(
        &state,
        CheckoutInput {
            event_id: EventId(body.event_id),
            ticket_id: TicketId(body.ticket_uuid),
            quantity,
            buyer,
        },
    )
    .await
}

async fn checkout(
    state: &AppState,
    input: CheckoutInput,
) -> Result<Json<CreateSessionResponse>, TicketingError> {
    let session = state.checkout_usecase().execute(input).await?;
    Ok(Json(CreateSessionResponse {
        success: true,
        session_id: session.session_id,
        session_url: session.session_url,
    }))
}

/// A limiter outage lets the request through.
async fn enforce_rate_limit(state: &AppState, identifier: &str) -> Result<(), TicketingError> {
    match state.rate_limiter().check(identifier).await {
        Ok(decision) if decision.allowed => Ok(()),
        Ok(decision) => {
            warn!(identifier, reset_at_ms = decision.reset_at_ms, "checkout rate limited");
            Err(TicketingError::RateLimited {
                reset_at_ms: decision.reset_at_ms,
            })
        }
        Err(e) => {
            warn!(identifier, error = %e, "rate limiter unavailable, allowing request");
            Ok(())
        }
    }
}

fn parse_quantity(quantity: i64) -> Result<u32, TicketingError> {
    u32::try_from(quantity)
        .map_err(|_| TicketingError::InvalidQuantity)
        .and_then(validate_quantity)
}

fn guest_buyer(name: Option<&str>, email: Option<&str>) -> Result<Buyer, TicketingError> {
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(TicketingError::InvalidRequest("guest_name is required"))?;
    let email = email
        .map(normalise_email)
        .filter(|e| is_plausible_email(e))
        .ok_or(TicketingError::InvalidRequest("a valid guest_email is required"))?;
    Ok(Buyer::Guest {
        name: name.to_owned(),
        email,
    })
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

fn guest_identifier(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_owned()
}
