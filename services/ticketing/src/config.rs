use std::str::FromStr;

use gather_domain::fee::FeeSchedule;
use gather_domain::id::UserId;
use gather_domain::rate_limit::RateLimitPolicy;

/// Ticketing service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct TicketingConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL (checkout rate limiter).
    pub redis_url: String,
    /// TCP port for the HTTP server (default 3120). Env var: `TICKETING_PORT`.
    pub ticketing_port: u16,
    /// Secret key for the payment processor API.
    pub payment_api_key: String,
    /// Processor API base URL. Env var: `PAYMENT_API_BASE`.
    pub payment_api_base: String,
    /// Webhook signing secret. When unset every webhook is rejected.
    pub payment_webhook_secret: Option<String>,
    pub email_api_key: String,
    /// Email provider API base URL. Env var: `EMAIL_API_BASE`.
    pub email_api_base: String,
    /// Sender address on outgoing mail.
    pub email_from: String,
    /// Public site origin used for checkout return URLs.
    pub public_base_url: String,
    /// Bearer token guarding `GET /workers/process-reminders`.
    pub worker_bearer_token: String,
    /// Organiser account whose events never trigger notifications.
    pub sentinel_account_id: Option<UserId>,
    pub fee_schedule: FeeSchedule,
    /// ISO currency code, lowercase (default `gbp`).
    pub currency: String,
    pub checkout_rate_limit: RateLimitPolicy,
    /// Jobs run at once by one worker (default 5).
    pub worker_concurrency: u32,
    /// How long one `process-reminders` call keeps draining the queue (default 50s).
    pub worker_window_secs: u64,
}

impl TicketingConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL").expect("REDIS_URL"),
            ticketing_port: env_or("TICKETING_PORT", 3120),
            payment_api_key: std::env::var("PAYMENT_API_KEY").expect("PAYMENT_API_KEY"),
            payment_api_base: std::env::var("PAYMENT_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_owned()),
            payment_webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            email_api_key: std::env::var("EMAIL_API_KEY").expect("EMAIL_API_KEY"),
            email_api_base: std::env::var("EMAIL_API_BASE")
                .unwrap_or_else(|_| "https://api.resend.com".to_owned()),
            email_from: std::env::var("EMAIL_FROM").expect("EMAIL_FROM"),
            public_base_url: std::env::var("PUBLIC_BASE_URL").expect("PUBLIC_BASE_URL"),
            worker_bearer_token: std::env::var("WORKER_BEARER_TOKEN")
                .expect("WORKER_BEARER_TOKEN"),
            sentinel_account_id: std::env::var("SENTINEL_ACCOUNT_ID")
                .ok()
                .map(|v| v.parse().expect("SENTINEL_ACCOUNT_ID must be a UUID")),
            fee_schedule: FeeSchedule::v1(
                env_or("PLATFORM_FEE_BPS", 1_000),
                env_or("PLATFORM_FEE_FIXED_MINOR", 0),
            ),
            currency: std::env::var("CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|_| "gbp".to_owned()),
            checkout_rate_limit: RateLimitPolicy::new(
                env_or("CHECKOUT_RATE_LIMIT", 10),
                env_or("CHECKOUT_RATE_WINDOW_SECS", 60),
            ),
            worker_concurrency: env_or("WORKER_CONCURRENCY", 5),
            worker_window_secs: env_or("WORKER_WINDOW_SECS", 50),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
