//! Authoritative settlement decision.
//!
//! Evaluated inside the settlement transaction against rows locked for update, so the
//! snapshot cannot move underneath it. The eligibility gate at checkout time is advisory;
//! this is the check that decides whether a captured payment becomes a registration.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use gather_domain::id::RegistrationId;
use gather_domain::payment::PaymentStatus;

use crate::domain::types::{PaymentRecord, RegistrationRecord, SettlementOrder};

/// Locked state read inside the settlement transaction.
#[derive(Debug, Clone)]
pub struct SettlementSnapshot {
    pub payment: PaymentRecord,
    /// Stock ceiling of the ticket; `None` means unlimited.
    pub stock: Option<i32>,
    /// Sum of quantities over every registration referencing the ticket.
    pub registered_quantity: i64,
    /// Registration already held by the buyer's email for this event.
    pub existing_registration: Option<RegistrationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementDecision {
    /// Insert the registration and mark the payment succeeded.
    Settle,
    /// Redelivery of a completion that was already applied.
    AlreadySettled {
        registration_id: Option<RegistrationId>,
    },
    /// The payment reached a terminal state some other way; nothing to do.
    Ignore { status: PaymentStatus },
    /// Captured payment that cannot become a registration.
    Reject { reason: String },
}

pub fn decide_settlement(snapshot: &SettlementSnapshot, order: &SettlementOrder) -> SettlementDecision {
    let payment = &snapshot.payment;
    match payment.status {
        PaymentStatus::Pending => {}
        PaymentStatus::Succeeded | PaymentStatus::Refunded => {
            return SettlementDecision::AlreadySettled {
                registration_id: payment.registration_id,
            };
        }
        PaymentStatus::Failed => {
            return SettlementDecision::Ignore {
                status: payment.status,
            };
        }
    }

    let meta = &order.metadata;
    if meta.event_id != payment.event_id || meta.ticket_id != payment.ticket_id {
        return reject("metadata does not match payment");
    }
    if meta.quantity != payment.quantity {
        return reject("quantity does not match payment");
    }
    if order
        .amount_total
        .is_some_and(|total| total != payment.fee.gross)
    {
        return reject("amount does not match payment");
    }

    if let Some(existing) = &snapshot.existing_registration {
        if existing.payment_id == Some(payment.id) {
            return SettlementDecision::AlreadySettled {
                registration_id: Some(existing.id),
            };
        }
        return reject("holder already registered for this event");
    }

    if let Some(stock) = snapshot.stock {
        let remaining = i64::from(stock) - snapshot.registered_quantity;
        if remaining < i64::from(payment.quantity) {
            return reject(if remaining <= 0 {
                "sold out"
            } else {
                "insufficient stock"
            });
        }
    }

    SettlementDecision::Settle
}

/// Registration issued for a settled payment. Holder details come from the payment row,
/// which was written from the gate's checked order.
pub fn registration_for(payment: &PaymentRecord, now: DateTime<Utc>) -> RegistrationRecord {
    RegistrationRecord {
        id: RegistrationId(Uuid::now_v7()),
        event_id: payment.event_id,
        ticket_id: payment.ticket_id,
        user_id: payment.payer_id,
        holder_name: payment.buyer_name.clone(),
        holder_email: payment.buyer_email.clone(),
        quantity: payment.quantity,
        is_external: payment.is_external,
        payment_id: Some(payment.id),
        payment_status: Some(PaymentStatus::Succeeded),
        created_at: now,
    }
}

fn reject(reason: &str) -> SettlementDecision {
    SettlementDecision::Reject {
        reason: reason.to_owned(),
    }
}
