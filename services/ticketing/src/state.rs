use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool as RedisPool;
use sea_orm::DatabaseConnection;

use crate::config::TicketingConfig;
use crate::infra::db::{
    DbEventRepository, DbPaymentRepository, DbPeopleRepository, DbRegistrationRepository,
    DbSettlementRepository,
};
use crate::infra::email::HttpEmailSender;
use crate::infra::processor::HttpPaymentProcessor;
use crate::infra::queue::DbJobQueue;
use crate::infra::rate_limit::RedisRateLimiter;
use crate::usecase::checkout::{CreateCheckoutUseCase, ReturnUrls};
use crate::usecase::eligibility::EligibilityGate;
use crate::usecase::notifications::NotificationHandlers;
use crate::usecase::scheduler::NotificationScheduler;
use crate::usecase::settlement::ReconcileUseCase;
use crate::worker::Worker;

pub type DbCheckoutUseCase = CreateCheckoutUseCase<
    DbEventRepository,
    DbRegistrationRepository,
    DbPeopleRepository,
    DbPaymentRepository,
    HttpPaymentProcessor,
>;

pub type DbReconcileUseCase = ReconcileUseCase<
    DbSettlementRepository,
    DbEventRepository,
    DbPeopleRepository,
    HttpEmailSender,
    DbJobQueue,
>;

pub type DbNotificationHandlers = NotificationHandlers<
    DbEventRepository,
    DbRegistrationRepository,
    DbPeopleRepository,
    HttpEmailSender,
    DbJobQueue,
>;

pub type DbWorker = Worker<DbJobQueue, DbNotificationHandlers>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    pub http: reqwest::Client,
    pub config: Arc<TicketingConfig>,
}

impl AppState {
    pub fn event_repo(&self) -> DbEventRepository {
        DbEventRepository {
            db: self.db.clone(),
        }
    }

    pub fn registration_repo(&self) -> DbRegistrationRepository {
        DbRegistrationRepository {
            db: self.db.clone(),
        }
    }

    pub fn people_repo(&self) -> DbPeopleRepository {
        DbPeopleRepository {
            db: self.db.clone(),
        }
    }

    pub fn payment_repo(&self) -> DbPaymentRepository {
        DbPaymentRepository {
            db: self.db.clone(),
        }
    }

    pub fn settlement_repo(&self) -> DbSettlementRepository {
        DbSettlementRepository {
            db: self.db.clone(),
        }
    }

    pub fn job_queue(&self) -> DbJobQueue {
        DbJobQueue {
            db: self.db.clone(),
        }
    }

    pub fn rate_limiter(&self) -> RedisRateLimiter {
        RedisRateLimiter {
            pool: self.redis.clone(),
            policy: self.config.checkout_rate_limit,
        }
    }

    pub fn processor(&self) -> HttpPaymentProcessor {
        HttpPaymentProcessor {
            http: self.http.clone(),
            base_url: self.config.payment_api_base.clone(),
            api_key: self.config.payment_api_key.clone(),
        }
    }

    pub fn email_sender(&self) -> HttpEmailSender {
        HttpEmailSender {
            http: self.http.clone(),
            base_url: self.config.email_api_base.clone(),
            api_key: self.config.email_api_key.clone(),
            from: self.config.email_from.clone(),
        }
    }

    pub fn scheduler(&self) -> NotificationScheduler<DbJobQueue> {
        NotificationScheduler {
            queue: self.job_queue(),
        }
    }

    pub fn eligibility_gate(
        &self,
    ) -> EligibilityGate<DbEventRepository, DbRegistrationRepository, DbPeopleRepository> {
        EligibilityGate {
            events: self.event_repo(),
            registrations: self.registration_repo(),
            people: self.people_repo(),
        }
    }

    pub fn checkout_usecase(&self) -> DbCheckoutUseCase {
        CreateCheckoutUseCase {
            gate: self.eligibility_gate(),
            payments: self.payment_repo(),
            processor: self.processor(),
            fees: self.config.fee_schedule,
            currency: self.config.currency.clone(),
            urls: ReturnUrls {
                public_base_url: self.config.public_base_url.clone(),
            },
        }
    }

    pub fn reconcile_usecase(&self) -> DbReconcileUseCase {
        ReconcileUseCase {
            settlements: self.settlement_repo(),
            events: self.event_repo(),
            people: self.people_repo(),
            email: self.email_sender(),
            scheduler: self.scheduler(),
            sentinel_account: self.config.sentinel_account_id,
        }
    }

    pub fn notification_handlers(&self) -> DbNotificationHandlers {
        NotificationHandlers {
            events: self.event_repo(),
            registrations: self.registration_repo(),
            people: self.people_repo(),
            email: self.email_sender(),
            scheduler: self.scheduler(),
            sentinel_account: self.config.sentinel_account_id,
        }
    }

    pub fn worker(&self, concurrency: u32, poll_interval: Duration) -> DbWorker {
        Worker {
            queue: self.job_queue(),
            handler: self.notification_handlers(),
            concurrency,
            poll_interval,
        }
    }
}
