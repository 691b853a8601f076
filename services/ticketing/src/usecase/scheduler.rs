use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use gather_domain::id::EventId;
use gather_domain::job::{
    EVENT_JOB_RETRY_DELAY_SECS, EventJobPayload, Job, JobKind, ReminderPayload,
};

use crate::domain::repository::JobQueue;
use crate::domain::types::{
    Enqueued, EventRecord, NOTIFICATION_LEAD_HOURS, NewJob, RegistrationRecord,
};
use crate::error::TicketingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { job_id: String },
    /// An equivalent job is already waiting, delayed or active.
    Skipped { job_id: String },
}

impl ScheduleOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Scheduled { job_id } | Self::Skipped { job_id } => job_id,
        }
    }
}

/// Enqueues delayed notification jobs. Event-scoped jobs are deduplicated by key.
pub struct NotificationScheduler<Q: JobQueue> {
    pub queue: Q,
}

impl<Q: JobQueue> NotificationScheduler<Q> {
    /// Reminders are per registration and never deduplicated; each carries its own
    /// attempt counter.
    pub async fn schedule_user_reminder(
        &self,
        payload: ReminderPayload,
        delay_secs: u64,
    ) -> Result<ScheduleOutcome, TicketingError> {
        let kind = JobKind::UserReminder;
        let job = NewJob {
            id: Uuid::now_v7().to_string(),
            name: kind.name().to_owned(),
            payload: Job::UserReminder(payload).payload(),
            run_at: run_at(delay_secs),
            max_attempts: kind.queue_attempts(),
        };
        self.queue.enqueue(&job).await?;
        Ok(ScheduleOutcome::Scheduled { job_id: job.id })
    }

    pub async fn schedule_external_forwarding(
        &self,
        event_id: EventId,
        delay_secs: u64,
    ) -> Result<ScheduleOutcome, TicketingError> {
        self.schedule_event_job(JobKind::ExternalForwarding, event_id, false, delay_secs)
            .await
    }

    pub async fn schedule_organizer_summary(
        &self,
        event_id: EventId,
        delay_secs: u64,
    ) -> Result<ScheduleOutcome, TicketingError> {
        self.schedule_event_job(JobKind::OrganizerSummary, event_id, false, delay_secs)
            .await
    }

    /// One more try of a failed event-scoped job, under its own key so the still-active
    /// original does not swallow it.
    pub async fn schedule_event_retry(
        &self,
        kind: JobKind,
        event_id: EventId,
    ) -> Result<ScheduleOutcome, TicketingError> {
        self.schedule_event_job(kind, event_id, true, EVENT_JOB_RETRY_DELAY_SECS)
            .await
    }

    async fn schedule_event_job(
        &self,
        kind: JobKind,
        event_id: EventId,
        is_retry: bool,
        delay_secs: u64,
    ) -> Result<ScheduleOutcome, TicketingError> {
        let key = if is_retry {
            kind.retry_key(event_id)
        } else {
            kind.dedup_key(event_id)
        }
        .ok_or_else(|| anyhow!("{} is not an event-scoped job", kind.name()))?;

        if let Some(existing) = self.queue.find(&key).await? {
            if existing.state.is_live() {
                info!(job_id = %key, state = existing.state.as_str(), "job already scheduled");
                return Ok(ScheduleOutcome::Skipped { job_id: key });
            }
        }

        let payload = EventJobPayload { event_id, is_retry };
        let job = match kind {
            JobKind::ExternalForwarding => Job::ExternalForwarding(payload),
            JobKind::OrganizerSummary => Job::OrganizerSummary(payload),
            JobKind::UserReminder => {
                return Err(anyhow!("reminders are scheduled per registration").into());
            }
        };
        let new_job = NewJob {
            id: key,
            name: kind.name().to_owned(),
            payload: job.payload(),
            run_at: run_at(delay_secs),
            max_attempts: kind.queue_attempts(),
        };
        match self.queue.enqueue(&new_job).await? {
            Enqueued::Created => Ok(ScheduleOutcome::Scheduled { job_id: new_job.id }),
            // lost a race with a concurrent scheduler
            Enqueued::Exists => Ok(ScheduleOutcome::Skipped { job_id: new_job.id }),
        }
    }

    /// Schedule every notification a fresh registration needs. Best-effort: failures are
    /// logged and never surface to the caller.
    pub async fn schedule_for_registration(
        &self,
        event: &EventRecord,
        registration: &RegistrationRecord,
        now: DateTime<Utc>,
    ) {
        let plan = NotificationPlan::for_registration(event, registration, now);

        if let Some(delay) = plan.reminder_delay {
            let payload = ReminderPayload::new(event.id, registration.id);
            if let Err(e) = self.schedule_user_reminder(payload, delay).await {
                warn!(event_id = %event.id, registration_id = %registration.id, error = %e, "failed to schedule reminder");
            }
        }
        if let Some(delay) = plan.summary_delay {
            if let Err(e) = self.schedule_organizer_summary(event.id, delay).await {
                warn!(event_id = %event.id, error = %e, "failed to schedule organiser summary");
            }
        }
        if let Some(delay) = plan.forwarding_delay {
            if let Err(e) = self.schedule_external_forwarding(event.id, delay).await {
                warn!(event_id = %event.id, error = %e, "failed to schedule external forwarding");
            }
        }
    }
}

/// Longest delay accepted by the queue (one year).
const MAX_DELAY_SECS: u64 = 366 * 86_400;

fn run_at(delay_secs: u64) -> DateTime<Utc> {
    let secs = delay_secs.min(MAX_DELAY_SECS) as i64;
    Utc::now() + Duration::seconds(secs)
}

/// Delays, in seconds from now, of the jobs a registration triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPlan {
    pub reminder_delay: Option<u64>,
    pub summary_delay: Option<u64>,
    pub forwarding_delay: Option<u64>,
}

impl NotificationPlan {
    pub fn for_registration(
        event: &EventRecord,
        registration: &RegistrationRecord,
        now: DateTime<Utc>,
    ) -> Self {
        if now >= event.start_at {
            return Self {
                reminder_delay: None,
                summary_delay: None,
                forwarding_delay: None,
            };
        }
        let lead = delay_until(event.start_at - Duration::hours(NOTIFICATION_LEAD_HOURS), now);
        let forwarding_delay = (registration.is_external && event.forwarding_email.is_some())
            .then(|| {
                let hours = event
                    .external_cutoff_hours
                    .map(i64::from)
                    .unwrap_or(NOTIFICATION_LEAD_HOURS);
                delay_until(event.start_at - Duration::hours(hours), now)
            });
        Self {
            reminder_delay: Some(lead),
            summary_delay: Some(lead),
            forwarding_delay,
        }
    }
}

fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((at - now).num_seconds()).unwrap_or(0)
}
