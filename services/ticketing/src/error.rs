use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Ticketing service error variants.
///
/// Buyer-facing rejections carry a specific message; organiser configuration problems
/// are kept apart so the buyer is not blamed for them.
#[derive(Debug, thiserror::Error)]
pub enum TicketingError {
    #[error("quantity must be between 1 and 10")]
    InvalidQuantity,
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("event not found")]
    EventNotFound,
    #[error("ticket not found")]
    TicketNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("this event has already ended")]
    EventEnded,
    #[error("sign in to register for this event")]
    GuestNotPermitted,
    #[error("you are not eligible to register for this event")]
    NotEligible,
    #[error("registration for this event has closed")]
    RegistrationClosed,
    #[error("this ticket is free and does not need a checkout")]
    TicketNotPaid,
    #[error("this ticket is not on sale right now")]
    TicketNotOnSale,
    #[error("this ticket is sold out")]
    SoldOut,
    #[error("only {remaining} tickets remaining")]
    InsufficientStock { remaining: i64 },
    #[error("you are already registered for this event")]
    AlreadyRegistered,
    #[error("the organiser has not finished setting up payments for this event")]
    OrganiserAccountNotReady,
    #[error("too many checkout attempts, try again later")]
    RateLimited { reset_at_ms: u64 },
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("invalid webhook payload")]
    InvalidPayload,
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl TicketingError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidQuantity => "INVALID_QUANTITY",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::EventNotFound => "EVENT_NOT_FOUND",
            Self::TicketNotFound => "TICKET_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::EventEnded => "EVENT_ENDED",
            Self::GuestNotPermitted => "GUEST_NOT_PERMITTED",
            Self::NotEligible => "NOT_ELIGIBLE",
            Self::RegistrationClosed => "REGISTRATION_CLOSED",
            Self::TicketNotPaid => "TICKET_NOT_PAID",
            Self::TicketNotOnSale => "TICKET_NOT_ON_SALE",
            Self::SoldOut => "SOLD_OUT",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::OrganiserAccountNotReady => "ORGANISER_ACCOUNT_NOT_READY",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidQuantity
            | Self::InvalidRequest(_)
            | Self::EventEnded
            | Self::RegistrationClosed
            | Self::TicketNotPaid
            | Self::TicketNotOnSale
            | Self::SoldOut
            | Self::InsufficientStock { .. }
            | Self::OrganiserAccountNotReady
            | Self::InvalidSignature
            | Self::InvalidPayload => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::GuestNotPermitted | Self::NotEligible => StatusCode::FORBIDDEN,
            Self::EventNotFound | Self::TicketNotFound | Self::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::AlreadyRegistered => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TicketingError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::Internal(ref e) = self {
            tracing::error!(error = ?e, kind = "INTERNAL", "internal error");
        }
        let body = serde_json::json!({
            "success": false,
            "kind": self.kind(),
            "error": self.to_string(),
        });
        let mut response = (status, axum::Json(body)).into_response();
        if let Self::RateLimited { reset_at_ms } = self {
            response.headers_mut().insert(
                "x-ratelimit-reset",
                axum::http::HeaderValue::from(reset_at_ms),
            );
        }
        response
    }
}
