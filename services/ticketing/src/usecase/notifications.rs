use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use gather_domain::id::{EventId, UserId};
use gather_domain::job::{EventJobPayload, Job, JobKind, JobOutcome, ReminderPayload};

use crate::domain::repository::{
    EmailSender, EventRepository, JobQueue, PeopleRepository, RegistrationRepository,
};
use crate::domain::types::EventRecord;
use crate::error::TicketingError;
use crate::templates;
use crate::usecase::scheduler::NotificationScheduler;
use crate::worker::JobHandler;

/// Handlers for the three notification job kinds.
///
/// Each handler re-reads current state rather than trusting the payload, skips events
/// owned by the sentinel account, and on failure reschedules before returning the error
/// so the queue records the failed run as well.
pub struct NotificationHandlers<E, R, P, M, Q>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
    M: EmailSender,
    Q: JobQueue,
{
    pub events: E,
    pub registrations: R,
    pub people: P,
    pub email: M,
    pub scheduler: NotificationScheduler<Q>,
    pub sentinel_account: Option<UserId>,
}

enum Loaded {
    Event(EventRecord),
    Skip(JobOutcome),
}

impl<E, R, P, M, Q> NotificationHandlers<E, R, P, M, Q>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
    M: EmailSender,
    Q: JobQueue,
{
    pub async fn dispatch(
        &self,
        job: Job,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        match job {
            Job::UserReminder(payload) => self.send_user_reminder(payload, now).await,
            Job::ExternalForwarding(payload) => self.send_external_forwarding(payload, now).await,
            Job::OrganizerSummary(payload) => self.send_organizer_summary(payload, now).await,
        }
    }

    pub async fn send_user_reminder(
        &self,
        payload: ReminderPayload,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        match self.try_user_reminder(&payload, now).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => match payload.next_attempt() {
                Some((next, delay)) => {
                    warn!(
                        registration_id = %payload.registration_id,
                        attempts = payload.attempts,
                        retry_in_secs = delay,
                        error = %err,
                        "reminder failed; rescheduling"
                    );
                    if let Err(e) = self.scheduler.schedule_user_reminder(next, delay).await {
                        error!(registration_id = %payload.registration_id, error = %e, "failed to reschedule reminder");
                    }
                    Err(err)
                }
                None => {
                    error!(
                        registration_id = %payload.registration_id,
                        attempts = payload.attempts,
                        error = %err,
                        "reminder failed; giving up"
                    );
                    Ok(JobOutcome::terminal("max_attempts_reached"))
                }
            },
        }
    }

    async fn try_user_reminder(
        &self,
        payload: &ReminderPayload,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        let event = match self.load_event(payload.event_id, now).await? {
            Loaded::Event(event) => event,
            Loaded::Skip(outcome) => return Ok(outcome),
        };
        let Some(registration) = self.registrations.find_by_id(payload.registration_id).await?
        else {
            return Ok(JobOutcome::skipped("registration_not_found"));
        };
        if registration.is_refunded() {
            return Ok(JobOutcome::skipped("registration_refunded"));
        }

        self.email
            .send(&templates::reminder_email(&event, &registration))
            .await?;
        info!(registration_id = %registration.id, event_id = %event.id, "reminder sent");
        Ok(JobOutcome::sent())
    }

    pub async fn send_external_forwarding(
        &self,
        payload: EventJobPayload,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        let result = self.try_external_forwarding(&payload, now).await;
        self.retry_event_job(JobKind::ExternalForwarding, &payload, result)
            .await
    }

    async fn try_external_forwarding(
        &self,
        payload: &EventJobPayload,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        let event = match self.load_event(payload.event_id, now).await? {
            Loaded::Event(event) => event,
            Loaded::Skip(outcome) => return Ok(outcome),
        };
        let Some(to) = event.forwarding_email.clone() else {
            return Ok(JobOutcome::skipped("no_forwarding_address"));
        };
        let attendees: Vec<_> = self
            .registrations
            .list_for_event(event.id)
            .await?
            .into_iter()
            .filter(|r| r.is_external && !r.is_refunded())
            .collect();
        if attendees.is_empty() {
            return Ok(JobOutcome::skipped("no_external_attendees"));
        }
        let organiser = self.people.find_organiser(event.organiser_id).await?;

        self.email
            .send(&templates::forwarding_email(
                &event,
                &to,
                organiser.as_ref(),
                &attendees,
            ))
            .await?;
        info!(event_id = %event.id, attendees = attendees.len(), "external attendees forwarded");
        Ok(JobOutcome::sent())
    }

    pub async fn send_organizer_summary(
        &self,
        payload: EventJobPayload,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        let result = self.try_organizer_summary(&payload, now).await;
        self.retry_event_job(JobKind::OrganizerSummary, &payload, result)
            .await
    }

    async fn try_organizer_summary(
        &self,
        payload: &EventJobPayload,
        now: DateTime<Utc>,
    ) -> Result<JobOutcome, TicketingError> {
        let event = match self.load_event(payload.event_id, now).await? {
            Loaded::Event(event) => event,
            Loaded::Skip(outcome) => return Ok(outcome),
        };
        let Some(organiser) = self.people.find_organiser(event.organiser_id).await? else {
            error!(event_id = %event.id, organiser_id = %event.organiser_id, "organiser unresolvable");
            return Ok(JobOutcome::terminal("organiser_unresolvable"));
        };
        if organiser.email.trim().is_empty() {
            error!(event_id = %event.id, organiser_id = %organiser.id, "organiser has no email address");
            return Ok(JobOutcome::terminal("organiser_unresolvable"));
        }
        if !organiser.notifications_enabled {
            return Ok(JobOutcome::skipped("notifications_disabled"));
        }
        let registrations = self.registrations.list_for_event(event.id).await?;

        self.email
            .send(&templates::summary_email(&event, &organiser, &registrations))
            .await?;
        info!(event_id = %event.id, registrations = registrations.len(), "organiser summary sent");
        Ok(JobOutcome::sent())
    }

    /// Event-scoped jobs get exactly one handler-level retry after a flat delay.
    async fn retry_event_job(
        &self,
        kind: JobKind,
        payload: &EventJobPayload,
        result: Result<JobOutcome, TicketingError>,
    ) -> Result<JobOutcome, TicketingError> {
        let err = match result {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };
        if payload.is_retry {
            warn!(job = kind.name(), event_id = %payload.event_id, error = %err, "retry failed");
            return Err(err);
        }
        warn!(job = kind.name(), event_id = %payload.event_id, error = %err, "job failed; scheduling retry");
        if let Err(e) = self.scheduler.schedule_event_retry(kind, payload.event_id).await {
            error!(job = kind.name(), event_id = %payload.event_id, error = %e, "failed to schedule retry");
        }
        Err(err)
    }

    /// Load the event and apply the guards every job shares.
    async fn load_event(
        &self,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<Loaded, TicketingError> {
        let Some(event) = self.events.find_event(event_id).await? else {
            return Ok(Loaded::Skip(JobOutcome::skipped("event_not_found")));
        };
        if event.is_deleted {
            return Ok(Loaded::Skip(JobOutcome::skipped("event_deleted")));
        }
        if self.sentinel_account == Some(event.organiser_id) {
            return Ok(Loaded::Skip(JobOutcome::skipped("sentinel_account")));
        }
        if now > event.start_at {
            return Ok(Loaded::Skip(JobOutcome::skipped("event_started")));
        }
        Ok(Loaded::Event(event))
    }
}

impl<E, R, P, M, Q> JobHandler for NotificationHandlers<E, R, P, M, Q>
where
    E: EventRepository,
    R: RegistrationRepository,
    P: PeopleRepository,
    M: EmailSender,
    Q: JobQueue,
{
    async fn handle(&self, job: Job, now: DateTime<Utc>) -> Result<JobOutcome, TicketingError> {
        self.dispatch(job, now).await
    }
}
