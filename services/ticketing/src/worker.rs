#![allow(async_fn_in_trait)]

use std::ops::AddAssign;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream;
use tokio::time::Instant;
use tracing::{info, warn};

use gather_domain::job::{Job, JobOutcome};

use crate::domain::repository::JobQueue;
use crate::domain::types::{JobState, QueuedJob};
use crate::error::TicketingError;

/// Runs one decoded job. Implemented by the notification handlers; tests plug in fakes.
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job, now: DateTime<Utc>) -> Result<JobOutcome, TicketingError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: u32,
    pub succeeded: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl AddAssign for BatchSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.succeeded += rhs.succeeded;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
    Succeeded,
    Skipped,
    Failed,
}

/// Pulls due jobs from the queue and runs them, at most `concurrency` at a time.
pub struct Worker<Q: JobQueue, H: JobHandler> {
    pub queue: Q,
    pub handler: H,
    pub concurrency: u32,
    pub poll_interval: Duration,
}

impl<Q: JobQueue, H: JobHandler> Worker<Q, H> {
    /// Claim one batch of due jobs and run it to completion.
    pub async fn run_batch(&self) -> Result<BatchSummary, TicketingError> {
        let limit = self.concurrency.max(1);
        let jobs = self.queue.claim_due(Utc::now(), limit).await?;

        let results: Vec<Processed> = stream::iter(jobs)
            .map(|job| self.process(job))
            .buffer_unordered(limit as usize)
            .collect()
            .await;

        let mut summary = BatchSummary::default();
        for result in results {
            summary.processed += 1;
            match result {
                Processed::Succeeded => summary.succeeded += 1,
                Processed::Skipped => summary.skipped += 1,
                Processed::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Keep draining the queue until `deadline`, sleeping between empty polls.
    pub async fn run_until(&self, deadline: Instant) -> BatchSummary {
        let mut total = BatchSummary::default();
        while Instant::now() < deadline {
            let idle = match self.run_batch().await {
                Ok(batch) => {
                    total += batch;
                    batch.processed == 0
                }
                Err(e) => {
                    warn!(error = %e, "failed to claim jobs");
                    true
                }
            };
            if idle {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(self.poll_interval.min(remaining)).await;
            }
        }
        info!(
            processed = total.processed,
            succeeded = total.succeeded,
            skipped = total.skipped,
            failed = total.failed,
            "worker window finished"
        );
        total
    }

    async fn process(&self, queued: QueuedJob) -> Processed {
        let job = match Job::decode(&queued.name, queued.payload.clone()) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %queued.id, name = %queued.name, error = %e, "undecodable job");
                self.record_failure(&queued, &e.to_string()).await;
                return Processed::Failed;
            }
        };

        match self.handler.handle(job, Utc::now()).await {
            Ok(outcome) => {
                if let Err(e) = self.queue.complete(&queued.id, &outcome).await {
                    warn!(job_id = %queued.id, error = %e, "failed to mark job completed");
                }
                if !outcome.success {
                    warn!(job_id = %queued.id, reason = ?outcome.reason, "job finished unsuccessfully");
                    Processed::Failed
                } else if outcome.is_skip() {
                    info!(job_id = %queued.id, reason = ?outcome.reason, "job skipped");
                    Processed::Skipped
                } else {
                    Processed::Succeeded
                }
            }
            Err(e) => {
                self.record_failure(&queued, &e.to_string()).await;
                Processed::Failed
            }
        }
    }

    async fn record_failure(&self, queued: &QueuedJob, error: &str) {
        match self.queue.fail(&queued.id, error, Utc::now()).await {
            Ok(JobState::Failed) => {
                warn!(job_id = %queued.id, attempts = queued.attempts_made, error, "job failed permanently");
            }
            Ok(state) => {
                info!(job_id = %queued.id, attempts = queued.attempts_made, state = state.as_str(), error, "job failed; queued for another attempt");
            }
            Err(e) => {
                warn!(job_id = %queued.id, error = %e, "failed to record job failure");
            }
        }
    }
}
