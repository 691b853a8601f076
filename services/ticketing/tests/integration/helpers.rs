#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use gather_domain::access::{AccessTier, EventAccess};
use gather_domain::fee::FeeSchedule;
use gather_domain::id::{EventId, RegistrationId, TicketId, UserId};
use gather_domain::job::{JobKind, JobOutcome};
use gather_domain::payment::PaymentStatus;

use gather_ticketing::domain::repository::{
    EmailSender, EventRepository, JobQueue, PaymentProcessor, PaymentRepository,
    PeopleRepository, RegistrationRepository, SettlementRepository,
};
use gather_ticketing::domain::settlement::{
    SettlementDecision, SettlementSnapshot, decide_settlement, registration_for,
};
use gather_ticketing::domain::types::{
    AccountSnapshot, BuyerProfile, CheckoutCompletion, CheckoutSessionRequest, EmailMessage,
    Enqueued, EventRecord, JobState, NewJob, OrganiserProfile, PaymentRecord, ProcessorAccount,
    ProcessorEvent, ProcessorSession, QueuedJob, RefundNotice, RefundResult, RegistrationRecord,
    SettlementOrder, SettlementResult, TicketRecord,
};
use gather_ticketing::error::TicketingError;
use gather_ticketing::usecase::checkout::{CreateCheckoutUseCase, ReturnUrls};
use gather_ticketing::usecase::eligibility::EligibilityGate;
use gather_ticketing::usecase::notifications::NotificationHandlers;
use gather_ticketing::usecase::scheduler::NotificationScheduler;
use gather_ticketing::usecase::settlement::ReconcileUseCase;

// ── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct StoreData {
    pub events: Vec<EventRecord>,
    pub tickets: Vec<TicketRecord>,
    pub buyers: Vec<BuyerProfile>,
    pub organisers: Vec<OrganiserProfile>,
    pub payments: Vec<PaymentRecord>,
    pub registrations: Vec<RegistrationRecord>,
}

/// In-memory implementation of every repository port. Clones share the same data.
///
/// Settlement runs under one lock, standing in for the row locks of the SQL version.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub data: Arc<Mutex<StoreData>>,
    pub fail_payment_insert: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn payment_by_session(&self, session_id: &str) -> Option<PaymentRecord> {
        self.data
            .lock()
            .unwrap()
            .payments
            .iter()
            .find(|p| p.session_id == session_id)
            .cloned()
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        self.data.lock().unwrap().registrations.clone()
    }

    pub fn organiser(&self, id: UserId) -> Option<OrganiserProfile> {
        self.data
            .lock()
            .unwrap()
            .organisers
            .iter()
            .find(|o| o.id == id)
            .cloned()
    }

    pub fn add_buyer(&self, affiliation: Option<&str>, email: &str) -> UserId {
        let id = UserId(Uuid::new_v4());
        self.data.lock().unwrap().buyers.push(BuyerProfile {
            id,
            email: email.to_owned(),
            name: email.split('@').next().unwrap_or("buyer").to_owned(),
            affiliation: affiliation.map(str::to_owned),
            group_ids: vec![],
        });
        id
    }

    pub fn add_registration(&self, registration: RegistrationRecord) {
        self.data.lock().unwrap().registrations.push(registration);
    }

    pub fn update_event(&self, id: EventId, f: impl FnOnce(&mut EventRecord)) {
        let mut data = self.data.lock().unwrap();
        if let Some(event) = data.events.iter_mut().find(|e| e.id == id) {
            f(event);
        }
    }

    pub fn update_organiser(&self, id: UserId, f: impl FnOnce(&mut OrganiserProfile)) {
        let mut data = self.data.lock().unwrap();
        if let Some(organiser) = data.organisers.iter_mut().find(|o| o.id == id) {
            f(organiser);
        }
    }
}

fn mark_failed(payment: &mut PaymentRecord, reason: &str) {
    payment.status = PaymentStatus::Failed;
    payment.failure_reason = Some(reason.to_owned());
    payment.updated_at = Utc::now();
}

impl EventRepository for MemoryStore {
    async fn find_event(&self, id: EventId) -> Result<Option<EventRecord>, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data.events.iter().find(|e| e.id == id).cloned())
    }

    async fn find_ticket(&self, id: TicketId) -> Result<Option<TicketRecord>, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data.tickets.iter().find(|t| t.id == id).cloned())
    }
}

impl RegistrationRepository for MemoryStore {
    async fn registered_quantity(&self, ticket_id: TicketId) -> Result<i64, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .registrations
            .iter()
            .filter(|r| r.ticket_id == ticket_id)
            .map(|r| i64::from(r.quantity))
            .sum())
    }

    async fn find_by_holder(
        &self,
        event_id: EventId,
        holder_email: &str,
    ) -> Result<Option<RegistrationRecord>, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .registrations
            .iter()
            .find(|r| r.event_id == event_id && r.holder_email == holder_email)
            .cloned())
    }

    async fn find_by_id(
        &self,
        id: RegistrationId,
    ) -> Result<Option<RegistrationRecord>, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data.registrations.iter().find(|r| r.id == id).cloned())
    }

    async fn list_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<RegistrationRecord>, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .registrations
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }
}

impl PeopleRepository for MemoryStore {
    async fn find_buyer(&self, id: UserId) -> Result<Option<BuyerProfile>, TicketingError> {
        let data = self.data.lock().unwrap();
        Ok(data.buyers.iter().find(|b| b.id == id).cloned())
    }

    async fn find_organiser(
        &self,
        id: UserId,
    ) -> Result<Option<OrganiserProfile>, TicketingError> {
        Ok(self.organiser(id))
    }
}

impl PaymentRepository for MemoryStore {
    async fn create_pending(&self, payment: &PaymentRecord) -> Result<(), TicketingError> {
        if self.fail_payment_insert.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("connection reset").into());
        }
        let mut data = self.data.lock().unwrap();
        if data.payments.iter().any(|p| p.session_id == payment.session_id) {
            return Err(anyhow::anyhow!("duplicate session id").into());
        }
        data.payments.push(payment.clone());
        Ok(())
    }
}

impl SettlementRepository for MemoryStore {
    async fn settle_checkout(
        &self,
        order: &SettlementOrder,
    ) -> Result<SettlementResult, TicketingError> {
        let mut data = self.data.lock().unwrap();
        let Some(index) = data
            .payments
            .iter()
            .position(|p| p.session_id == order.session_id)
        else {
            return Ok(SettlementResult::Rejected {
                reason: "payment not found".to_owned(),
            });
        };
        let payment = data.payments[index].clone();
        let Some(stock) = data
            .tickets
            .iter()
            .find(|t| t.id == payment.ticket_id)
            .map(|t| t.stock)
        else {
            mark_failed(&mut data.payments[index], "ticket not found");
            return Ok(SettlementResult::Rejected {
                reason: "ticket not found".to_owned(),
            });
        };
        let snapshot = SettlementSnapshot {
            registered_quantity: data
                .registrations
                .iter()
                .filter(|r| r.ticket_id == payment.ticket_id)
                .map(|r| i64::from(r.quantity))
                .sum(),
            existing_registration: data
                .registrations
                .iter()
                .find(|r| r.event_id == payment.event_id && r.holder_email == payment.buyer_email)
                .cloned(),
            stock,
            payment,
        };

        Ok(match decide_settlement(&snapshot, order) {
            SettlementDecision::Settle => {
                let now = Utc::now();
                let registration = registration_for(&snapshot.payment, now);
                data.registrations.push(registration.clone());
                let payment = &mut data.payments[index];
                payment.status = PaymentStatus::Succeeded;
                payment.payment_reference = order.payment_reference.clone();
                payment.registration_id = Some(registration.id);
                payment.updated_at = now;
                SettlementResult::Settled {
                    payment: payment.clone(),
                    registration,
                }
            }
            SettlementDecision::AlreadySettled { registration_id } => {
                SettlementResult::AlreadySettled { registration_id }
            }
            SettlementDecision::Ignore { status } => SettlementResult::Ignored { status },
            SettlementDecision::Reject { reason } => {
                mark_failed(&mut data.payments[index], &reason);
                SettlementResult::Rejected { reason }
            }
        })
    }

    async fn fail_pending(&self, session_id: &str, reason: &str) -> Result<bool, TicketingError> {
        let mut data = self.data.lock().unwrap();
        match data
            .payments
            .iter_mut()
            .find(|p| p.session_id == session_id && p.status == PaymentStatus::Pending)
        {
            Some(payment) => {
                mark_failed(payment, reason);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn refund(&self, notice: &RefundNotice) -> Result<RefundResult, TicketingError> {
        let mut data = self.data.lock().unwrap();
        let Some(payment) = data
            .payments
            .iter_mut()
            .find(|p| p.payment_reference.as_deref() == Some(notice.payment_reference.as_str()))
        else {
            return Ok(RefundResult::UnknownPayment);
        };
        match payment.status {
            PaymentStatus::Refunded => return Ok(RefundResult::AlreadyRefunded),
            PaymentStatus::Succeeded => {}
            status => return Ok(RefundResult::NotRefundable { status }),
        }
        payment.status = PaymentStatus::Refunded;
        payment.refund_amount_minor = Some(notice.amount_refunded);
        payment.refund_reference = Some(notice.refund_reference.clone());
        let payment_id = payment.id;
        let registration_id = payment.registration_id;
        for registration in data
            .registrations
            .iter_mut()
            .filter(|r| r.payment_id == Some(payment_id))
        {
            registration.payment_status = Some(PaymentStatus::Refunded);
        }
        Ok(RefundResult::Refunded {
            payment_id,
            registration_id,
        })
    }

    async fn sync_account(&self, snapshot: &AccountSnapshot) -> Result<bool, TicketingError> {
        let mut data = self.data.lock().unwrap();
        let mut matched = false;
        for account in data
            .organisers
            .iter_mut()
            .filter_map(|o| o.account.as_mut())
            .filter(|a| a.account_id == snapshot.account_id)
        {
            account.charges_enabled = snapshot.charges_enabled;
            account.payouts_enabled = snapshot.payouts_enabled;
            account.details_submitted = snapshot.details_submitted;
            matched = true;
        }
        Ok(matched)
    }
}

// ── MemoryQueue ──────────────────────────────────────────────────────────────

/// Job queue with the same claim / fail / replace rules as the SQL queue.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    pub jobs: Arc<Mutex<BTreeMap<String, QueuedJob>>>,
    pub results: Arc<Mutex<BTreeMap<String, JobOutcome>>>,
}

impl MemoryQueue {
    pub fn all(&self) -> Vec<QueuedJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    pub fn named(&self, kind: JobKind) -> Vec<QueuedJob> {
        self.all()
            .into_iter()
            .filter(|j| j.name == kind.name())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<QueuedJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    pub fn result(&self, id: &str) -> Option<JobOutcome> {
        self.results.lock().unwrap().get(id).cloned()
    }

    /// Pull every pending job's run time into the past.
    pub fn make_all_due(&self) {
        let past = Utc::now() - Duration::seconds(1);
        for job in self.jobs.lock().unwrap().values_mut() {
            if matches!(job.state, JobState::Waiting | JobState::Delayed) {
                job.run_at = past;
            }
        }
    }

    pub fn set_state(&self, id: &str, state: JobState) {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(id) {
            job.state = state;
        }
    }

    pub fn insert_raw(&self, id: &str, name: &str, payload: serde_json::Value) {
        self.jobs.lock().unwrap().insert(
            id.to_owned(),
            QueuedJob {
                id: id.to_owned(),
                name: name.to_owned(),
                payload,
                state: JobState::Waiting,
                attempts_made: 0,
                max_attempts: 1,
                run_at: Utc::now() - Duration::seconds(1),
                last_error: None,
            },
        );
    }
}

impl JobQueue for MemoryQueue {
    async fn find(&self, id: &str) -> Result<Option<QueuedJob>, TicketingError> {
        Ok(self.get(id))
    }

    async fn enqueue(&self, job: &NewJob) -> Result<Enqueued, TicketingError> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.get(&job.id).is_some_and(|j| j.state.is_live()) {
            return Ok(Enqueued::Exists);
        }
        let state = if job.run_at <= Utc::now() {
            JobState::Waiting
        } else {
            JobState::Delayed
        };
        jobs.insert(
            job.id.clone(),
            QueuedJob {
                id: job.id.clone(),
                name: job.name.clone(),
                payload: job.payload.clone(),
                state,
                attempts_made: 0,
                max_attempts: job.max_attempts,
                run_at: job.run_at,
                last_error: None,
            },
        );
        Ok(Enqueued::Created)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueuedJob>, TicketingError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut due: Vec<&mut QueuedJob> = jobs
            .values_mut()
            .filter(|j| matches!(j.state, JobState::Waiting | JobState::Delayed) && j.run_at <= now)
            .collect();
        due.sort_by_key(|j| j.run_at);
        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|job| {
                job.state = JobState::Active;
                job.attempts_made += 1;
                job.clone()
            })
            .collect())
    }

    async fn complete(&self, id: &str, outcome: &JobOutcome) -> Result<(), TicketingError> {
        self.set_state(id, JobState::Completed);
        self.results
            .lock()
            .unwrap()
            .insert(id.to_owned(), outcome.clone());
        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<JobState, TicketingError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("job {id} not found"))?;
        job.last_error = Some(error.to_owned());
        if job.attempts_made < job.max_attempts {
            let backoff = JobKind::from_name(&job.name)
                .map(|k| k.queue_backoff_secs(job.attempts_made))
                .unwrap_or(60);
            job.state = JobState::Delayed;
            job.run_at = now + Duration::seconds(backoff as i64);
        } else {
            job.state = JobState::Failed;
        }
        Ok(job.state)
    }
}

// ── MockProcessor ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockProcessor {
    pub requests: Arc<Mutex<Vec<CheckoutSessionRequest>>>,
    pub counter: Arc<AtomicU32>,
}

impl PaymentProcessor for MockProcessor {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<ProcessorSession, TicketingError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        Ok(ProcessorSession {
            id: format!("cs_test_{n}"),
            url: format!("https://checkout.example/pay/cs_test_{n}"),
        })
    }
}

// ── MockEmail ────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockEmail {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
    pub attempts: Arc<AtomicU32>,
    pub fail: Arc<AtomicBool>,
}

impl MockEmail {
    pub fn failing() -> Self {
        let email = Self::default();
        email.fail.store(true, Ordering::SeqCst);
        email
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EmailSender for MockEmail {
    async fn send(&self, message: &EmailMessage) -> Result<(), TicketingError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("email provider unavailable").into());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub const ORGANISER_EMAIL: &str = "organiser@example.com";
pub const PRICE_MINOR: i64 = 1_000;

/// One paid event with a single ticket, an organiser with a ready account, and the
/// ports wired over shared in-memory state.
pub struct World {
    pub store: MemoryStore,
    pub queue: MemoryQueue,
    pub processor: MockProcessor,
    pub email: MockEmail,
    pub event_id: EventId,
    pub ticket_id: TicketId,
    pub organiser_id: UserId,
    pub sentinel_account: Option<UserId>,
}

impl World {
    pub fn new(stock: Option<i32>) -> Self {
        let now = Utc::now();
        let organiser_id = UserId(Uuid::new_v4());
        let event_id = EventId(Uuid::new_v4());
        let ticket_id = TicketId(Uuid::new_v4());
        let start = now + Duration::days(7);
        let store = MemoryStore::default();
        {
            let mut data = store.data.lock().unwrap();
            data.events.push(EventRecord {
                id: event_id,
                organiser_id,
                title: "Winter Ceilidh".to_owned(),
                location: Some("Main Hall".to_owned()),
                start_at: start,
                end_at: start + Duration::hours(4),
                access: EventAccess::new(AccessTier::Public, AccessTier::Public, vec![])
                    .unwrap(),
                registration_cutoff_hours: None,
                external_cutoff_hours: None,
                forwarding_email: Some("porter@example.com".to_owned()),
                is_deleted: false,
            });
            data.tickets.push(TicketRecord {
                id: ticket_id,
                event_id,
                name: "Standard".to_owned(),
                price_minor: PRICE_MINOR,
                stock,
                release_start: None,
                release_end: None,
            });
            data.organisers.push(OrganiserProfile {
                id: organiser_id,
                email: ORGANISER_EMAIL.to_owned(),
                name: "Dance Society".to_owned(),
                affiliation: Some("Edinburgh".to_owned()),
                notifications_enabled: true,
                account: Some(ProcessorAccount {
                    account_id: "acct_dance".to_owned(),
                    charges_enabled: true,
                    payouts_enabled: true,
                    details_submitted: true,
                }),
            });
        }
        Self {
            store,
            queue: MemoryQueue::default(),
            processor: MockProcessor::default(),
            email: MockEmail::default(),
            event_id,
            ticket_id,
            organiser_id,
            sentinel_account: None,
        }
    }

    pub fn checkout(
        &self,
    ) -> CreateCheckoutUseCase<MemoryStore, MemoryStore, MemoryStore, MemoryStore, MockProcessor>
    {
        CreateCheckoutUseCase {
            gate: EligibilityGate {
                events: self.store.clone(),
                registrations: self.store.clone(),
                people: self.store.clone(),
            },
            payments: self.store.clone(),
            processor: self.processor.clone(),
            fees: FeeSchedule::v1(1_000, 0),
            currency: "gbp".to_owned(),
            urls: ReturnUrls {
                public_base_url: "https://gather.example".to_owned(),
            },
        }
    }

    pub fn scheduler(&self) -> NotificationScheduler<MemoryQueue> {
        NotificationScheduler {
            queue: self.queue.clone(),
        }
    }

    pub fn reconciler(
        &self,
    ) -> ReconcileUseCase<MemoryStore, MemoryStore, MemoryStore, MockEmail, MemoryQueue> {
        ReconcileUseCase {
            settlements: self.store.clone(),
            events: self.store.clone(),
            people: self.store.clone(),
            email: self.email.clone(),
            scheduler: self.scheduler(),
            sentinel_account: self.sentinel_account,
        }
    }

    pub fn handlers(
        &self,
    ) -> NotificationHandlers<MemoryStore, MemoryStore, MemoryStore, MockEmail, MemoryQueue> {
        NotificationHandlers {
            events: self.store.clone(),
            registrations: self.store.clone(),
            people: self.store.clone(),
            email: self.email.clone(),
            scheduler: self.scheduler(),
            sentinel_account: self.sentinel_account,
        }
    }

    /// Completion event the processor would send for a session created by `checkout()`.
    pub fn completion(&self, session_id: &str) -> ProcessorEvent {
        let request = self
            .processor
            .requests
            .lock()
            .unwrap()
            .iter()
            .zip(1u32..)
            .find(|(_, n)| format!("cs_test_{n}") == session_id)
            .map(|(r, _)| r.clone())
            .expect("no checkout request for session");
        ProcessorEvent::CheckoutCompleted(CheckoutCompletion {
            session_id: session_id.to_owned(),
            payment_reference: Some(format!("pi_{session_id}")),
            amount_total: Some(request.unit_amount_minor * i64::from(request.quantity)),
            paid: true,
            metadata: request.metadata.to_map(),
        })
    }

    /// A settled registration for `email`, as if bought earlier.
    pub fn registration(&self, email: &str, quantity: u32, is_external: bool) -> RegistrationRecord {
        RegistrationRecord {
            id: RegistrationId(Uuid::now_v7()),
            event_id: self.event_id,
            ticket_id: self.ticket_id,
            user_id: None,
            holder_name: "Holder".to_owned(),
            holder_email: email.to_owned(),
            quantity,
            is_external,
            payment_id: None,
            payment_status: Some(PaymentStatus::Succeeded),
            created_at: Utc::now(),
        }
    }
}

pub fn guest(name: &str, email: &str) -> gather_ticketing::domain::types::Buyer {
    gather_ticketing::domain::types::Buyer::Guest {
        name: name.to_owned(),
        email: email.to_owned(),
    }
}
