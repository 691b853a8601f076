//! Long-running notification worker. Drains the job queue until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sea_orm::Database;
use tokio::time::Instant;
use tracing::info;

use gather_core::tracing::init_tracing;
use gather_ticketing::config::TicketingConfig;
use gather_ticketing::infra::http::outbound_client;
use gather_ticketing::state::AppState;

const SUMMARY_WINDOW: Duration = Duration::from_secs(3600);

/// Poll the notification queue and send due emails.
#[derive(Parser, Debug)]
#[command(name = "notifier")]
struct Args {
    /// Jobs run at once. Defaults to `WORKER_CONCURRENCY`.
    #[arg(long)]
    concurrency: Option<u32>,

    /// Sleep between polls when the queue is idle.
    #[arg(long, default_value_t = 1_000)]
    poll_interval_ms: u64,

    /// Stop after this many seconds. Runs until Ctrl-C when omitted.
    #[arg(long)]
    run_for_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let args = Args::parse();
    let config = TicketingConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let redis = deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let concurrency = args.concurrency.unwrap_or(config.worker_concurrency);
    let state = AppState {
        db,
        redis,
        http: outbound_client().expect("failed to build HTTP client"),
        config: Arc::new(config),
    };

    let worker = state.worker(concurrency, Duration::from_millis(args.poll_interval_ms));
    let run = async {
        match args.run_for_secs {
            Some(secs) => {
                worker.run_until(Instant::now() + Duration::from_secs(secs)).await;
            }
            // Summaries are logged at the end of every window.
            None => loop {
                worker.run_until(Instant::now() + SUMMARY_WINDOW).await;
            },
        }
    };

    info!(concurrency, "notifier started");
    tokio::select! {
        _ = run => info!("notifier window elapsed"),
        _ = tokio::signal::ctrl_c() => info!("notifier shutting down"),
    }
}
