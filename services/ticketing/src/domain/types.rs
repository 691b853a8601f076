use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use gather_domain::access::EventAccess;
use gather_domain::fee::FeeSplit;
use gather_domain::id::{EventId, GroupId, PaymentId, RegistrationId, TicketId, UserId};
use gather_domain::payment::PaymentStatus;

/// Quantity bounds for a single checkout.
pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 10;

/// Lifetime of an external checkout session.
pub const CHECKOUT_SESSION_TTL_MINS: i64 = 30;

/// Lead time of reminders and organiser summaries before the event starts.
pub const NOTIFICATION_LEAD_HOURS: i64 = 24;

/// A schedulable happening with capacity and access rules.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub id: EventId,
    pub organiser_id: UserId,
    pub title: String,
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub access: EventAccess,
    pub registration_cutoff_hours: Option<i32>,
    pub external_cutoff_hours: Option<i32>,
    pub forwarding_email: Option<String>,
    pub is_deleted: bool,
}

impl EventRecord {
    /// Instant after which registration closes for the caller, if a cutoff is configured.
    ///
    /// External callers are bound by the external cutoff when one is set.
    pub fn registration_cutoff(&self, is_external: bool) -> Option<DateTime<Utc>> {
        let hours = if is_external {
            self.external_cutoff_hours.or(self.registration_cutoff_hours)
        } else {
            self.registration_cutoff_hours
        }?;
        Some(self.start_at - Duration::hours(i64::from(hours)))
    }
}

/// A purchasable tier within an event.
#[derive(Debug, Clone)]
pub struct TicketRecord {
    pub id: TicketId,
    pub event_id: EventId,
    pub name: String,
    pub price_minor: i64,
    /// Stock ceiling; `None` means unlimited.
    pub stock: Option<i32>,
    pub release_start: Option<DateTime<Utc>>,
    pub release_end: Option<DateTime<Utc>>,
}

impl TicketRecord {
    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        self.release_start.is_none_or(|start| now >= start)
            && self.release_end.is_none_or(|end| now <= end)
    }
}

/// Signed-in buyer as seen by the eligibility checks.
#[derive(Debug, Clone)]
pub struct BuyerProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub affiliation: Option<String>,
    pub group_ids: Vec<GroupId>,
}

/// Organiser of an event together with their payment-processor sub-account.
#[derive(Debug, Clone)]
pub struct OrganiserProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub affiliation: Option<String>,
    pub notifications_enabled: bool,
    pub account: Option<ProcessorAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorAccount {
    pub account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

impl ProcessorAccount {
    /// Both charges and payouts must be active before money can flow to the organiser.
    pub fn is_ready(&self) -> bool {
        self.charges_enabled && self.payouts_enabled
    }
}

/// Who is buying.
#[derive(Debug, Clone)]
pub enum Buyer {
    Member(UserId),
    Guest { name: String, email: String },
}

/// Identity the registration will be issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub user_id: Option<UserId>,
    pub name: String,
    pub email: String,
}

impl Holder {
    pub fn is_guest(&self) -> bool {
        self.user_id.is_none()
    }
}

/// A record of one checkout attempt.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub event_id: EventId,
    pub ticket_id: TicketId,
    pub payer_id: Option<UserId>,
    pub session_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub quantity: u32,
    pub is_guest: bool,
    pub is_external: bool,
    pub currency: String,
    pub fee: FeeSplit,
    pub status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub registration_id: Option<RegistrationId>,
    pub refund_amount_minor: Option<i64>,
    pub refund_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A confirmed attendance slot.
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub id: RegistrationId,
    pub event_id: EventId,
    pub ticket_id: TicketId,
    pub user_id: Option<UserId>,
    pub holder_name: String,
    pub holder_email: String,
    pub quantity: u32,
    pub is_external: bool,
    pub payment_id: Option<PaymentId>,
    pub payment_status: Option<PaymentStatus>,
    pub created_at: DateTime<Utc>,
}

impl RegistrationRecord {
    pub fn is_refunded(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Refunded)
    }
}

/// Order data carried through the processor in session metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub event_id: EventId,
    pub ticket_id: TicketId,
    /// Buyer user id, or `"guest"`.
    pub buyer_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub quantity: u32,
    pub is_external: bool,
    pub is_guest: bool,
}

pub const GUEST_BUYER_ID: &str = "guest";

impl CheckoutMetadata {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("event_id".to_owned(), self.event_id.to_string()),
            ("ticket_id".to_owned(), self.ticket_id.to_string()),
            ("buyer_id".to_owned(), self.buyer_id.clone()),
            ("buyer_email".to_owned(), self.buyer_email.clone()),
            ("buyer_name".to_owned(), self.buyer_name.clone()),
            ("quantity".to_owned(), self.quantity.to_string()),
            ("is_external".to_owned(), self.is_external.to_string()),
            ("is_guest".to_owned(), self.is_guest.to_string()),
        ])
    }

    /// Rebuild metadata from the processor's string map.
    ///
    /// Returns the name of the first missing or malformed field on failure.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, &'static str> {
        fn field<'a>(
            map: &'a BTreeMap<String, String>,
            name: &'static str,
        ) -> Result<&'a str, &'static str> {
            map.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or(name)
        }
        fn parsed<T: std::str::FromStr>(
            map: &BTreeMap<String, String>,
            name: &'static str,
        ) -> Result<T, &'static str> {
            field(map, name)?.parse().map_err(|_| name)
        }

        let buyer_id = field(map, "buyer_id")?.to_owned();
        let is_guest: bool = parsed(map, "is_guest")?;
        if !is_guest && buyer_id.parse::<UserId>().is_err() {
            return Err("buyer_id");
        }
        Ok(Self {
            event_id: parsed(map, "event_id")?,
            ticket_id: parsed(map, "ticket_id")?,
            buyer_id,
            buyer_email: field(map, "buyer_email")?.to_owned(),
            buyer_name: field(map, "buyer_name")?.to_owned(),
            quantity: parsed(map, "quantity")?,
            is_external: parsed(map, "is_external")?,
            is_guest,
        })
    }

    pub fn buyer_user_id(&self) -> Option<UserId> {
        if self.is_guest {
            None
        } else {
            self.buyer_id.parse().ok()
        }
    }
}

/// Request sent to the processor to open a one-shot payment session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub line_item_name: String,
    pub unit_amount_minor: i64,
    pub quantity: u32,
    pub currency: String,
    pub application_fee_minor: i64,
    pub destination_account: String,
    pub customer_email: String,
    pub metadata: CheckoutMetadata,
    pub expires_at: DateTime<Utc>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Session handle returned by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSession {
    pub id: String,
    pub url: String,
}

/// Verified inbound processor event.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    CheckoutCompleted(CheckoutCompletion),
    CheckoutExpired { session_id: String },
    ChargeRefunded(RefundNotice),
    AccountUpdated(AccountSnapshot),
    Unhandled(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutCompletion {
    pub session_id: String,
    pub payment_reference: Option<String>,
    pub amount_total: Option<i64>,
    /// `false` while an asynchronous payment method is still clearing.
    pub paid: bool,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundNotice {
    pub payment_reference: String,
    pub amount_refunded: i64,
    pub refund_reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

/// Order reconstructed from a completed session.
#[derive(Debug, Clone)]
pub struct SettlementOrder {
    pub session_id: String,
    pub payment_reference: Option<String>,
    pub amount_total: Option<i64>,
    pub metadata: CheckoutMetadata,
}

/// Result of the settlement transaction.
#[derive(Debug, Clone)]
pub enum SettlementResult {
    Settled {
        payment: PaymentRecord,
        registration: RegistrationRecord,
    },
    AlreadySettled {
        registration_id: Option<RegistrationId>,
    },
    /// The payment already failed; the completion is acknowledged without effect.
    Ignored {
        status: PaymentStatus,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundResult {
    Refunded {
        payment_id: PaymentId,
        registration_id: Option<RegistrationId>,
    },
    AlreadyRefunded,
    /// The payment exists but is not in a refundable state (out-of-order delivery).
    NotRefundable { status: PaymentStatus },
    UnknownPayment,
}

/// A transactional email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Queue-side lifecycle of a notification job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "delayed" => Some(Self::Delayed),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Waiting, delayed and active jobs block a new job with the same id.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Waiting | Self::Delayed | Self::Active)
    }
}

/// A job to be written to the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub max_attempts: u32,
}

/// A job as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Created,
    /// A live job with the same id already exists.
    Exists,
}
