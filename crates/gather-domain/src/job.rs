//! Deferred notification jobs.
//!
//! Job kinds form a closed set; the worker dispatches with an exhaustive `match`, so a
//! new kind is a compile-time change. The wire names are what the queue stores.

use serde::{Deserialize, Serialize};

use crate::id::{EventId, RegistrationId};

/// Highest reminder attempt that may still be rescheduled after a failure.
pub const MAX_REMINDER_ATTEMPTS: u32 = 3;

/// Delay before a failed event-scoped job is tried once more, in seconds.
pub const EVENT_JOB_RETRY_DELAY_SECS: u64 = 3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    UserReminder,
    ExternalForwarding,
    OrganizerSummary,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::UserReminder,
        JobKind::ExternalForwarding,
        JobKind::OrganizerSummary,
    ];

    /// Queue-facing job name.
    pub fn name(self) -> &'static str {
        match self {
            Self::UserReminder => "send_event_email_reminder",
            Self::ExternalForwarding => "send_external_forwarding",
            Self::OrganizerSummary => "send_organizer_summary",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Event-scoped kinds are singletons per event and deduplicated by key.
    pub fn is_event_scoped(self) -> bool {
        !matches!(self, Self::UserReminder)
    }

    /// Attempts the queue itself makes before marking a job failed.
    ///
    /// Reminders get a single queue attempt: their retries are rescheduled by the
    /// handler with an incremented `attempts` counter.
    pub fn queue_attempts(self) -> u32 {
        match self {
            Self::UserReminder => 1,
            Self::ExternalForwarding | Self::OrganizerSummary => 3,
        }
    }

    /// Queue backoff after the `attempts_made`-th failure: 60s, 120s, 240s, ...
    pub fn queue_backoff_secs(self, attempts_made: u32) -> u64 {
        60u64.saturating_mul(1u64 << attempts_made.saturating_sub(1).min(16))
    }

    /// Deterministic job id for event-scoped kinds; `None` for reminders.
    pub fn dedup_key(self, event_id: EventId) -> Option<String> {
        self.is_event_scoped()
            .then(|| format!("{}:{}", self.name(), event_id))
    }

    /// Job id used when a failed event-scoped job is retried by its handler.
    pub fn retry_key(self, event_id: EventId) -> Option<String> {
        self.dedup_key(event_id).map(|key| format!("{key}:retry"))
    }
}

/// Payload of a per-registration reminder. `attempts` starts at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub event_id: EventId,
    pub registration_id: RegistrationId,
    #[serde(default = "first_attempt")]
    pub attempts: u32,
}

fn first_attempt() -> u32 {
    1
}

impl ReminderPayload {
    pub fn new(event_id: EventId, registration_id: RegistrationId) -> Self {
        Self {
            event_id,
            registration_id,
            attempts: first_attempt(),
        }
    }

    /// Payload and delay for the next attempt, or `None` once the cap is exceeded.
    pub fn next_attempt(&self) -> Option<(ReminderPayload, u64)> {
        if self.attempts > MAX_REMINDER_ATTEMPTS {
            return None;
        }
        let next = ReminderPayload {
            attempts: self.attempts + 1,
            ..self.clone()
        };
        Some((next, 3_600 * u64::from(self.attempts + 1)))
    }
}

/// Payload of an event-scoped job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventJobPayload {
    pub event_id: EventId,
    /// Set on the single handler-level retry; a retry never schedules another.
    #[serde(default)]
    pub is_retry: bool,
}

/// A typed job, as decoded from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    UserReminder(ReminderPayload),
    ExternalForwarding(EventJobPayload),
    OrganizerSummary(EventJobPayload),
}

#[derive(Debug, thiserror::Error)]
pub enum JobDecodeError {
    #[error("unknown job name: {0}")]
    UnknownName(String),
    #[error("invalid payload for {name}: {source}")]
    InvalidPayload {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::UserReminder(_) => JobKind::UserReminder,
            Self::ExternalForwarding(_) => JobKind::ExternalForwarding,
            Self::OrganizerSummary(_) => JobKind::OrganizerSummary,
        }
    }

    pub fn event_id(&self) -> EventId {
        match self {
            Self::UserReminder(p) => p.event_id,
            Self::ExternalForwarding(p) | Self::OrganizerSummary(p) => p.event_id,
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            Self::UserReminder(p) => serde_json::to_value(p),
            Self::ExternalForwarding(p) | Self::OrganizerSummary(p) => serde_json::to_value(p),
        };
        // plain structs of ids and integers always serialize
        value.unwrap_or(serde_json::Value::Null)
    }

    pub fn decode(name: &str, payload: serde_json::Value) -> Result<Self, JobDecodeError> {
        let kind =
            JobKind::from_name(name).ok_or_else(|| JobDecodeError::UnknownName(name.to_owned()))?;
        let invalid = |source| JobDecodeError::InvalidPayload {
            name: kind.name(),
            source,
        };
        Ok(match kind {
            JobKind::UserReminder => {
                Self::UserReminder(serde_json::from_value(payload).map_err(invalid)?)
            }
            JobKind::ExternalForwarding => {
                Self::ExternalForwarding(serde_json::from_value(payload).map_err(invalid)?)
            }
            JobKind::OrganizerSummary => {
                Self::OrganizerSummary(serde_json::from_value(payload).map_err(invalid)?)
            }
        })
    }
}

/// Structured result of a handler run that did not throw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl JobOutcome {
    pub fn sent() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    /// Skipped for a valid reason (sentinel account, event started, ...).
    pub fn skipped(reason: &str) -> Self {
        Self {
            success: true,
            reason: Some(reason.to_owned()),
        }
    }

    /// Terminal failure reported without throwing.
    pub fn terminal(reason: &str) -> Self {
        Self {
            success: false,
            reason: Some(reason.to_owned()),
        }
    }

    pub fn is_skip(&self) -> bool {
        self.success && self.reason.is_some()
    }
}
