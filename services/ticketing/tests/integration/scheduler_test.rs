use gather_domain::id::RegistrationId;
use gather_domain::job::{JobKind, ReminderPayload};
use gather_ticketing::domain::types::JobState;
use gather_ticketing::usecase::scheduler::ScheduleOutcome;
use uuid::Uuid;

use crate::helpers::World;

#[tokio::test]
async fn should_queue_one_forwarding_job_per_event() {
    let world = World::new(None);
    let scheduler = world.scheduler();

    let first = scheduler
        .schedule_external_forwarding(world.event_id, 3_600)
        .await
        .unwrap();
    let second = scheduler
        .schedule_external_forwarding(world.event_id, 60)
        .await
        .unwrap();

    let key = format!("send_external_forwarding:{}", world.event_id);
    assert_eq!(first, ScheduleOutcome::Scheduled { job_id: key.clone() });
    assert_eq!(second, ScheduleOutcome::Skipped { job_id: key.clone() });
    assert_eq!(world.queue.named(JobKind::ExternalForwarding).len(), 1);
    assert_eq!(world.queue.get(&key).unwrap().state, JobState::Delayed);
}

#[tokio::test]
async fn should_accept_new_job_once_previous_one_finished() {
    let world = World::new(None);
    let scheduler = world.scheduler();
    let first = scheduler
        .schedule_external_forwarding(world.event_id, 0)
        .await
        .unwrap();

    world.queue.set_state(first.job_id(), JobState::Completed);
    let again = scheduler
        .schedule_external_forwarding(world.event_id, 0)
        .await
        .unwrap();
    assert!(matches!(again, ScheduleOutcome::Scheduled { .. }));
    assert_eq!(world.queue.get(again.job_id()).unwrap().state, JobState::Waiting);

    world.queue.set_state(again.job_id(), JobState::Failed);
    let after_failure = scheduler
        .schedule_external_forwarding(world.event_id, 0)
        .await
        .unwrap();
    assert!(matches!(after_failure, ScheduleOutcome::Scheduled { .. }));
}

#[tokio::test]
async fn should_skip_while_previous_job_is_running() {
    let world = World::new(None);
    let scheduler = world.scheduler();
    let first = scheduler
        .schedule_organizer_summary(world.event_id, 0)
        .await
        .unwrap();
    world.queue.set_state(first.job_id(), JobState::Active);

    let second = scheduler
        .schedule_organizer_summary(world.event_id, 0)
        .await
        .unwrap();

    assert!(matches!(second, ScheduleOutcome::Skipped { .. }));
}

#[tokio::test]
async fn should_key_job_families_separately() {
    let world = World::new(None);
    let scheduler = world.scheduler();

    scheduler
        .schedule_external_forwarding(world.event_id, 0)
        .await
        .unwrap();
    let summary = scheduler
        .schedule_organizer_summary(world.event_id, 0)
        .await
        .unwrap();

    assert!(matches!(summary, ScheduleOutcome::Scheduled { .. }));
    assert_eq!(world.queue.all().len(), 2);
}

#[tokio::test]
async fn should_never_deduplicate_reminders() {
    let world = World::new(None);
    let scheduler = world.scheduler();
    let payload = ReminderPayload::new(world.event_id, RegistrationId(Uuid::new_v4()));

    let a = scheduler
        .schedule_user_reminder(payload.clone(), 60)
        .await
        .unwrap();
    let b = scheduler.schedule_user_reminder(payload, 60).await.unwrap();

    assert_ne!(a.job_id(), b.job_id());
    let reminders = world.queue.named(JobKind::UserReminder);
    assert_eq!(reminders.len(), 2);
    assert!(reminders.iter().all(|j| j.max_attempts == 1));
    assert_eq!(reminders[0].payload["attempts"], 1);
}
