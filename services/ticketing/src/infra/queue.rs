use anyhow::{Context as _, anyhow};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbBackend, DbErr,
    EntityTrait, Insert, Statement, sea_query::Expr, sea_query::OnConflict,
};

use gather_domain::job::{JobKind, JobOutcome};
use gather_ticketing_schema::notification_jobs;

use crate::domain::repository::JobQueue;
use crate::domain::types::{Enqueued, JobState, NewJob, QueuedJob};
use crate::error::TicketingError;

/// An active job whose worker has not reported back within this window is claimable
/// again, so a crashed worker does not strand it.
pub(crate) const ACTIVE_LEASE_SECS: i64 = 600;

const CLAIM_DUE_SQL: &str = r#"
    UPDATE notification_jobs
    SET state = 'active', attempts_made = attempts_made + 1, updated_at = $1
    WHERE id IN (
        SELECT id FROM notification_jobs
        WHERE (state IN ('waiting', 'delayed') AND run_at <= $1)
           OR (state = 'active' AND updated_at <= $2)
        ORDER BY run_at
        LIMIT $3
        FOR UPDATE SKIP LOCKED
    )
    RETURNING *
"#;

/// Postgres-backed delayed job queue.
#[derive(Clone)]
pub struct DbJobQueue {
    pub db: DatabaseConnection,
}

impl JobQueue for DbJobQueue {
    async fn find(&self, id: &str) -> Result<Option<QueuedJob>, TicketingError> {
        let model = notification_jobs::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await
            .context("find job")?;
        let job = model
            .map(job_from_model)
            .transpose()
            .context("decode job row")?;
        Ok(job)
    }

    async fn enqueue(&self, job: &NewJob) -> Result<Enqueued, TicketingError> {
        let inserted = enqueue_insert(job, Utc::now())
            .exec_without_returning(&self.db)
            .await;
        match inserted {
            Ok(0) | Err(DbErr::RecordNotInserted) => Ok(Enqueued::Exists),
            Ok(_) => Ok(Enqueued::Created),
            Err(e) => Err(anyhow::Error::new(e).context("enqueue job").into()),
        }
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<QueuedJob>, TicketingError> {
        let models = notification_jobs::Entity::find()
            .from_raw_sql(claim_due_statement(self.db.get_database_backend(), now, limit))
            .all(&self.db)
            .await
            .context("claim due jobs")?;
        let jobs = models
            .into_iter()
            .map(job_from_model)
            .collect::<Result<Vec<_>, _>>()
            .context("decode job rows")?;
        Ok(jobs)
    }

    async fn complete(&self, id: &str, outcome: &JobOutcome) -> Result<(), TicketingError> {
        let now = Utc::now();
        let result = serde_json::to_value(outcome).context("encode job outcome")?;
        notification_jobs::ActiveModel {
            id: Set(id.to_owned()),
            state: Set(JobState::Completed.as_str().to_owned()),
            result: Set(Some(result)),
            updated_at: Set(now),
            finished_at: Set(Some(now)),
            ..Default::default()
        }
        .update(&self.db)
        .await
        .context("complete job")?;
        Ok(())
    }

    async fn fail(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<JobState, TicketingError> {
        let model = notification_jobs::Entity::find_by_id(id.to_owned())
            .one(&self.db)
            .await
            .context("load failed job")?
            .ok_or_else(|| anyhow!("job {id} vanished before its failure was recorded"))?;

        let attempts_made = u32::try_from(model.attempts_made).unwrap_or(0);
        let max_attempts = u32::try_from(model.max_attempts).unwrap_or(1);
        let mut update = notification_jobs::ActiveModel {
            id: Set(id.to_owned()),
            last_error: Set(Some(error.to_owned())),
            updated_at: Set(now),
            ..Default::default()
        };
        let state = if attempts_made < max_attempts {
            let backoff = JobKind::from_name(&model.name)
                .map(|kind| kind.queue_backoff_secs(attempts_made))
                .unwrap_or(60);
            update.run_at = Set(now + Duration::seconds(backoff as i64));
            JobState::Delayed
        } else {
            update.finished_at = Set(Some(now));
            JobState::Failed
        };
        update.state = Set(state.as_str().to_owned());
        update.update(&self.db).await.context("record job failure")?;
        Ok(state)
    }
}

fn enqueue_insert(job: &NewJob, now: DateTime<Utc>) -> Insert<notification_jobs::ActiveModel> {
    let state = if job.run_at <= now {
        JobState::Waiting
    } else {
        JobState::Delayed
    };
    let model = notification_jobs::ActiveModel {
        id: Set(job.id.clone()),
        name: Set(job.name.clone()),
        payload: Set(job.payload.clone()),
        state: Set(state.as_str().to_owned()),
        attempts_made: Set(0),
        max_attempts: Set(job.max_attempts as i32),
        run_at: Set(job.run_at),
        last_error: Set(None),
        result: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        finished_at: Set(None),
    };
    // Only a finished job may be replaced; a live one keeps its slot.
    let on_conflict = OnConflict::column(notification_jobs::Column::Id)
        .update_columns([
            notification_jobs::Column::Name,
            notification_jobs::Column::Payload,
            notification_jobs::Column::State,
            notification_jobs::Column::AttemptsMade,
            notification_jobs::Column::MaxAttempts,
            notification_jobs::Column::RunAt,
            notification_jobs::Column::LastError,
            notification_jobs::Column::Result,
            notification_jobs::Column::CreatedAt,
            notification_jobs::Column::UpdatedAt,
            notification_jobs::Column::FinishedAt,
        ])
        .action_and_where(
            Expr::col((notification_jobs::Entity, notification_jobs::Column::State))
                .is_in([JobState::Completed.as_str(), JobState::Failed.as_str()]),
        )
        .to_owned();
    notification_jobs::Entity::insert(model).on_conflict(on_conflict)
}

fn claim_due_statement(backend: DbBackend, now: DateTime<Utc>, limit: u32) -> Statement {
    let stale = now - Duration::seconds(ACTIVE_LEASE_SECS);
    Statement::from_sql_and_values(
        backend,
        CLAIM_DUE_SQL,
        [now.into(), stale.into(), i64::from(limit).into()],
    )
}

fn job_from_model(model: notification_jobs::Model) -> Result<QueuedJob, DbErr> {
    let state = JobState::parse(&model.state)
        .ok_or_else(|| DbErr::Custom(format!("unknown job state {}", model.state)))?;
    Ok(QueuedJob {
        id: model.id,
        name: model.name,
        payload: model.payload,
        state,
        attempts_made: u32::try_from(model.attempts_made).unwrap_or(0),
        max_attempts: u32::try_from(model.max_attempts).unwrap_or(1),
        run_at: model.run_at,
        last_error: model.last_error,
    })
}
