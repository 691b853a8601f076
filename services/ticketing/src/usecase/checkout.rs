use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};
use uuid::Uuid;

use gather_domain::fee::{FeeSchedule, FeeSplit};
use gather_domain::id::{EventId, PaymentId, TicketId};
use gather_domain::payment::PaymentStatus;

use crate::domain::repository::{
    EventRepository, PaymentProcessor, PaymentRepository, PeopleRepository,
    RegistrationRepository,
};
use crate::domain::types::{
    Buyer, CHECKOUT_SESSION_TTL_MINS, CheckoutMetadata, CheckoutSessionRequest, GUEST_BUYER_ID,
    PaymentRecord,
};
use crate::error::TicketingError;
use crate::usecase::eligibility::{EligibilityGate, EligibilityRequest, EligibleOrder};

pub struct CheckoutInput {
    pub event_id: EventId,
    pub ticket_id: TicketId,
    pub quantity: u32,
    pub buyer: Buyer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub session_url: String,
}

/// Where the processor sends the buyer back to.
#[derive(Debug, Clone)]
pub struct ReturnUrls {
    pub public_base_url: String,
}

impl ReturnUrls {
    pub fn success(&self, event_id: EventId) -> String {
        format!(
            "{}/events/{event_id}?payment=success&session_id={{CHECKOUT_SESSION_ID}}",
            self.public_base_url.trim_end_matches('/')
        )
    }

    pub fn cancel(&self, event_id: EventId) -> String {
        format!(
            "{}/events/{event_id}?payment=cancelled",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

pub struct CreateCheckoutUseCase<E, R, P, G, X>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
    G: PaymentRepository,
    X: PaymentProcessor,
{
    pub gate: EligibilityGate<E, R, P>,
    pub payments: G,
    pub processor: X,
    pub fees: FeeSchedule,
    pub currency: String,
    pub urls: ReturnUrls,
}

impl<E, R, P, G, X> CreateCheckoutUseCase<E, R, P, G, X>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
    G: PaymentRepository,
    X: PaymentProcessor,
{
    pub async fn execute(&self, input: CheckoutInput) -> Result<CheckoutSession, TicketingError> {
        let now = Utc::now();
        let order = self
            .gate
            .check(EligibilityRequest {
                event_id: input.event_id,
                ticket_id: input.ticket_id,
                quantity: input.quantity,
                buyer: input.buyer,
                now,
            })
            .await?;

        let destination = order
            .organiser
            .account
            .as_ref()
            .filter(|a| a.is_ready())
            .map(|a| a.account_id.clone())
            .ok_or(TicketingError::OrganiserAccountNotReady)?;

        let split = self.fees.split(order_gross(order.ticket.price_minor, order.quantity)?);
        let request = self.session_request(&order, &split, destination, now);
        let session = self.processor.create_checkout_session(&request).await?;

        let payment = pending_payment(&order, &request, split, &session.id, now);
        // The session exists at the processor from here on; without this row the
        // settlement has nothing to anchor to.
        if let Err(e) = self.payments.create_pending(&payment).await {
            error!(
                session_id = %session.id,
                event_id = %order.event.id,
                error = %e,
                "failed to persist pending payment for created session"
            );
            return Err(e);
        }

        info!(
            session_id = %session.id,
            event_id = %order.event.id,
            quantity = order.quantity,
            gross = payment.fee.gross,
            "checkout session created"
        );
        Ok(CheckoutSession {
            session_id: session.id,
            session_url: session.url,
        })
    }

    fn session_request(
        &self,
        order: &EligibleOrder,
        split: &FeeSplit,
        destination_account: String,
        now: DateTime<Utc>,
    ) -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            line_item_name: format!("{} - {}", order.event.title, order.ticket.name),
            unit_amount_minor: order.ticket.price_minor,
            quantity: order.quantity,
            currency: self.currency.clone(),
            application_fee_minor: split.platform_fee,
            destination_account,
            customer_email: order.holder.email.clone(),
            metadata: CheckoutMetadata {
                event_id: order.event.id,
                ticket_id: order.ticket.id,
                buyer_id: order
                    .holder
                    .user_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| GUEST_BUYER_ID.to_owned()),
                buyer_email: order.holder.email.clone(),
                buyer_name: order.holder.name.clone(),
                quantity: order.quantity,
                is_external: order.is_external,
                is_guest: order.holder.is_guest(),
            },
            expires_at: now + Duration::minutes(CHECKOUT_SESSION_TTL_MINS),
            success_url: self.urls.success(order.event.id),
            cancel_url: self.urls.cancel(order.event.id),
        }
    }
}

fn order_gross(price_minor: i64, quantity: u32) -> Result<i64, TicketingError> {
    price_minor
        .checked_mul(i64::from(quantity))
        .ok_or(TicketingError::InvalidRequest("order total is out of range"))
}

fn pending_payment(
    order: &EligibleOrder,
    request: &CheckoutSessionRequest,
    fee: FeeSplit,
    session_id: &str,
    now: DateTime<Utc>,
) -> PaymentRecord {
    PaymentRecord {
        id: PaymentId(Uuid::now_v7()),
        event_id: order.event.id,
        ticket_id: order.ticket.id,
        payer_id: order.holder.user_id,
        session_id: session_id.to_owned(),
        buyer_email: order.holder.email.clone(),
        buyer_name: order.holder.name.clone(),
        quantity: order.quantity,
        is_guest: order.holder.is_guest(),
        is_external: order.is_external,
        currency: request.currency.clone(),
        fee,
        status: PaymentStatus::Pending,
        payment_reference: None,
        registration_id: None,
        refund_amount_minor: None,
        refund_reference: None,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}
