use chrono::Utc;
use tracing::{error, info, warn};

use gather_domain::id::{RegistrationId, UserId};

use crate::domain::repository::{
    EmailSender, EventRepository, JobQueue, PeopleRepository, SettlementRepository,
};
use crate::domain::types::{
    CheckoutCompletion, CheckoutMetadata, PaymentRecord, ProcessorEvent, RefundResult,
    RegistrationRecord, SettlementOrder, SettlementResult,
};
use crate::error::TicketingError;
use crate::templates;
use crate::usecase::scheduler::NotificationScheduler;

/// What a verified processor event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Settled { registration_id: RegistrationId },
    AlreadySettled,
    /// Captured payment that could not become a registration; raised as an alert.
    Rejected { reason: String },
    /// Completed session whose payment has not cleared yet.
    AwaitingPayment,
    Refunded,
    RefundIgnored,
    AccountSynced,
    AccountUnknown,
    Expired,
    ExpiryIgnored,
    Unhandled(String),
}

/// Applies verified processor events to payments and registrations.
///
/// Errors returned from `handle` are transient and make the processor redeliver. Email
/// and scheduling after a settlement are best-effort and never fail the call.
pub struct ReconcileUseCase<S, E, P, M, Q>
where
    S: SettlementRepository,
    E: EventRepository,
    P: PeopleRepository,
    M: EmailSender,
    Q: JobQueue,
{
    pub settlements: S,
    pub events: E,
    pub people: P,
    pub email: M,
    pub scheduler: NotificationScheduler<Q>,
    pub sentinel_account: Option<UserId>,
}

impl<S, E, P, M, Q> ReconcileUseCase<S, E, P, M, Q>
where
    S: SettlementRepository,
    E: EventRepository,
    P: PeopleRepository,
    M: EmailSender,
    Q: JobQueue,
{
    pub async fn handle(&self, event: ProcessorEvent) -> Result<ReconcileOutcome, TicketingError> {
        match event {
            ProcessorEvent::CheckoutCompleted(completion) => self.checkout_completed(completion).await,
            ProcessorEvent::CheckoutExpired { session_id } => {
                if self.settlements.fail_pending(&session_id, "expired").await? {
                    info!(session_id = %session_id, "checkout session expired");
                    Ok(ReconcileOutcome::Expired)
                } else {
                    Ok(ReconcileOutcome::ExpiryIgnored)
                }
            }
            ProcessorEvent::ChargeRefunded(notice) => {
                match self.settlements.refund(&notice).await? {
                    RefundResult::Refunded {
                        payment_id,
                        registration_id,
                    } => {
                        info!(
                            payment_id = %payment_id,
                            registration_id = ?registration_id.map(|r| r.to_string()),
                            amount = notice.amount_refunded,
                            "payment refunded"
                        );
                        Ok(ReconcileOutcome::Refunded)
                    }
                    RefundResult::AlreadyRefunded => Ok(ReconcileOutcome::Refunded),
                    RefundResult::NotRefundable { status } => {
                        warn!(
                            payment_reference = %notice.payment_reference,
                            status = status.as_str(),
                            "refund for payment that is not settled; ignoring"
                        );
                        Ok(ReconcileOutcome::RefundIgnored)
                    }
                    RefundResult::UnknownPayment => {
                        warn!(
                            payment_reference = %notice.payment_reference,
                            "refund for unknown payment; ignoring"
                        );
                        Ok(ReconcileOutcome::RefundIgnored)
                    }
                }
            }
            ProcessorEvent::AccountUpdated(snapshot) => {
                if self.settlements.sync_account(&snapshot).await? {
                    info!(
                        account_id = %snapshot.account_id,
                        charges_enabled = snapshot.charges_enabled,
                        payouts_enabled = snapshot.payouts_enabled,
                        "organiser account synced"
                    );
                    Ok(ReconcileOutcome::AccountSynced)
                } else {
                    warn!(account_id = %snapshot.account_id, "update for unknown organiser account");
                    Ok(ReconcileOutcome::AccountUnknown)
                }
            }
            ProcessorEvent::Unhandled(kind) => {
                info!(kind = %kind, "unhandled processor event acknowledged");
                Ok(ReconcileOutcome::Unhandled(kind))
            }
        }
    }

    async fn checkout_completed(
        &self,
        completion: CheckoutCompletion,
    ) -> Result<ReconcileOutcome, TicketingError> {
        if !completion.paid {
            info!(session_id = %completion.session_id, "checkout completed but payment not cleared");
            return Ok(ReconcileOutcome::AwaitingPayment);
        }

        let metadata = match CheckoutMetadata::from_map(&completion.metadata) {
            Ok(metadata) => metadata,
            Err(field) => {
                let reason = format!("incomplete metadata: {field}");
                self.settlements
                    .fail_pending(&completion.session_id, &reason)
                    .await?;
                return Ok(self.rejected(&completion.session_id, reason));
            }
        };

        let order = SettlementOrder {
            session_id: completion.session_id,
            payment_reference: completion.payment_reference,
            amount_total: completion.amount_total,
            metadata,
        };
        match self.settlements.settle_checkout(&order).await? {
            SettlementResult::Settled {
                payment,
                registration,
            } => {
                info!(
                    session_id = %order.session_id,
                    registration_id = %registration.id,
                    event_id = %registration.event_id,
                    quantity = registration.quantity,
                    "payment settled"
                );
                self.after_settlement(&payment, &registration).await;
                Ok(ReconcileOutcome::Settled {
                    registration_id: registration.id,
                })
            }
            SettlementResult::AlreadySettled { registration_id } => {
                info!(
                    session_id = %order.session_id,
                    registration_id = ?registration_id.map(|r| r.to_string()),
                    "completion redelivered; already settled"
                );
                Ok(ReconcileOutcome::AlreadySettled)
            }
            SettlementResult::Ignored { status } => {
                warn!(
                    session_id = %order.session_id,
                    status = status.as_str(),
                    "completion for payment no longer pending"
                );
                Ok(ReconcileOutcome::AlreadySettled)
            }
            SettlementResult::Rejected { reason } => Ok(self.rejected(&order.session_id, reason)),
        }
    }

    fn rejected(&self, session_id: &str, reason: String) -> ReconcileOutcome {
        error!(
            alert = true,
            session_id = %session_id,
            reason = %reason,
            "captured payment rejected at settlement; needs manual refund"
        );
        ReconcileOutcome::Rejected { reason }
    }

    async fn after_settlement(&self, payment: &PaymentRecord, registration: &RegistrationRecord) {
        let event = match self.events.find_event(registration.event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!(event_id = %registration.event_id, "settled event missing; skipping emails");
                return;
            }
            Err(e) => {
                warn!(event_id = %registration.event_id, error = %e, "failed to load event; skipping emails");
                return;
            }
        };
        let ticket_name = match self.events.find_ticket(registration.ticket_id).await {
            Ok(Some(ticket)) => ticket.name,
            _ => "Ticket".to_owned(),
        };
        let organiser = match self.people.find_organiser(event.organiser_id).await {
            Ok(organiser) => organiser,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "failed to load organiser");
                None
            }
        };

        let confirmation = templates::confirmation_email(
            &event,
            &ticket_name,
            registration,
            payment,
            organiser.as_ref().map(|o| o.email.as_str()),
        );
        if let Err(e) = self.email.send(&confirmation).await {
            warn!(registration_id = %registration.id, error = %e, "failed to send confirmation email");
        }

        let is_sentinel = self.sentinel_account == Some(event.organiser_id);
        match &organiser {
            Some(organiser) if !is_sentinel && organiser.notifications_enabled => {
                let notice = templates::organiser_sale_email(&event, organiser, registration, payment);
                if let Err(e) = self.email.send(&notice).await {
                    warn!(event_id = %event.id, error = %e, "failed to send organiser notification");
                }
            }
            _ => {}
        }

        self.scheduler
            .schedule_for_registration(&event, registration, Utc::now())
            .await;
    }
}
