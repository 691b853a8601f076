#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use gather_domain::id::{EventId, RegistrationId, TicketId, UserId};
use gather_domain::job::JobOutcome;
use gather_domain::rate_limit::RateLimitDecision;

use crate::domain::types::{
    AccountSnapshot, BuyerProfile, CheckoutSessionRequest, EmailMessage, Enqueued, EventRecord,
    JobState, NewJob, OrganiserProfile, PaymentRecord, ProcessorSession, QueuedJob, RefundNotice,
    RefundResult, RegistrationRecord, SettlementOrder, SettlementResult, TicketRecord,
};
use crate::error::TicketingError;

/// Read access to events and their tickets.
pub trait EventRepository: Send + Sync {
    async fn find_event(&self, id: EventId) -> Result<Option<EventRecord>, TicketingError>;
    async fn find_ticket(&self, id: TicketId) -> Result<Option<TicketRecord>, TicketingError>;
}

/// Read access to registrations.
pub trait RegistrationRepository: Send + Sync {
    /// Sum of quantities over every registration referencing the ticket.
    async fn registered_quantity(&self, ticket_id: TicketId) -> Result<i64, TicketingError>;

    async fn find_by_holder(
        &self,
        event_id: EventId,
        holder_email: &str,
    ) -> Result<Option<RegistrationRecord>, TicketingError>;

    async fn find_by_id(
        &self,
        id: RegistrationId,
    ) -> Result<Option<RegistrationRecord>, TicketingError>;

    async fn list_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<RegistrationRecord>, TicketingError>;
}

/// Buyer and organiser profiles.
pub trait PeopleRepository: Send + Sync {
    async fn find_buyer(&self, id: UserId) -> Result<Option<BuyerProfile>, TicketingError>;
    async fn find_organiser(&self, id: UserId)
    -> Result<Option<OrganiserProfile>, TicketingError>;
}

/// Writes the pending payment that anchors a checkout session.
pub trait PaymentRepository: Send + Sync {
    async fn create_pending(&self, payment: &PaymentRecord) -> Result<(), TicketingError>;
}

/// State transitions driven by verified processor events.
pub trait SettlementRepository: Send + Sync {
    /// Atomically turn a pending payment into a registration, or reject it.
    async fn settle_checkout(
        &self,
        order: &SettlementOrder,
    ) -> Result<SettlementResult, TicketingError>;

    /// Move a pending payment to failed. Returns `false` if no pending payment matched.
    async fn fail_pending(&self, session_id: &str, reason: &str) -> Result<bool, TicketingError>;

    async fn refund(&self, notice: &RefundNotice) -> Result<RefundResult, TicketingError>;

    /// Returns `false` if no organiser account matched.
    async fn sync_account(&self, snapshot: &AccountSnapshot) -> Result<bool, TicketingError>;
}

/// Durable delayed-job queue.
pub trait JobQueue: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<QueuedJob>, TicketingError>;

    /// Insert a job, replacing a finished job with the same id.
    async fn enqueue(&self, job: &NewJob) -> Result<Enqueued, TicketingError>;

    /// Mark up to `limit` due jobs active and return them.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueuedJob>, TicketingError>;

    async fn complete(&self, id: &str, outcome: &JobOutcome) -> Result<(), TicketingError>;

    /// Record a failed run. The job is delayed for another attempt or marked failed.
    async fn fail(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<JobState, TicketingError>;
}

/// Sliding-window request limiter.
pub trait RateLimiter: Send + Sync {
    async fn check(&self, identifier: &str) -> Result<RateLimitDecision, TicketingError>;
}

/// External payment processor.
pub trait PaymentProcessor: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProcessorSession, TicketingError>;
}

/// Transactional email provider.
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), TicketingError>;
}
