use std::sync::Arc;

use sea_orm::Database;
use tracing::info;

use gather_core::tracing::init_tracing;
use gather_ticketing::config::TicketingConfig;
use gather_ticketing::infra::http::outbound_client;
use gather_ticketing::router::build_router;
use gather_ticketing::state::AppState;

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = TicketingConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let port = config.ticketing_port;
    let state = AppState {
        db,
        redis,
        http: outbound_client().expect("failed to build HTTP client"),
        config: Arc::new(config),
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("ticketing service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
