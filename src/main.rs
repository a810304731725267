//! Bookstore checkout service - main application entry point.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Register the configured payment gateways
//! 4. Start the job worker and the periodic sweeps
//! 5. Build the HTTP router and serve

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use bookstore_checkout::{
    config::Config,
    db,
    gateways::GatewayRegistry,
    jobs::{JobDispatcher, queue::TokioJobQueue, runner::JobRunner, scheduler},
    routes::build_router,
    services::{
        order_service::OrderService, payment_service::PaymentService,
        refund_service::RefundService,
    },
    state::AppState,
};

const JOB_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let gateways = GatewayRegistry::from_config(&config)?;
    tracing::info!(gateways = ?gateways.kinds(), "Payment gateways registered");

    let (queue, receiver) = TokioJobQueue::new(JOB_QUEUE_CAPACITY);
    let jobs: Arc<dyn JobDispatcher> = Arc::new(queue);

    let orders = OrderService::new(pool.clone(), config.clone(), jobs.clone());
    let payments = PaymentService::new(
        pool.clone(),
        config.clone(),
        gateways.clone(),
        orders.clone(),
    );
    let refunds = RefundService::new(pool.clone(), config.clone(), gateways);

    let runner = Arc::new(JobRunner::new(
        pool.clone(),
        orders.clone(),
        payments.clone(),
        &config,
    ));
    receiver.spawn(runner);
    scheduler::start(&config, jobs);

    let app = build_router(AppState {
        pool,
        config: config.clone(),
        orders,
        payments,
        refunds,
    });

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
