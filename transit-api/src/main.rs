use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transit_api::{app, worker, AppState};
use transit_booking::{LicenseMonitor, RebalanceSignal};
use transit_core::{BookingStore, Notifier};
use transit_store::{Config, DbClient, Dispatcher, PgBookingStore, RedisClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transit_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Transit API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let db = Arc::new(db);

    let store: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(db.pool.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(
        Dispatcher::new(db.pool.clone(), &config.email, &config.sms).context("Failed to set up notifications")?,
    );

    let rules = &config.business_rules;
    let (signal, rebalance_rx) = RebalanceSignal::channel();
    let mut state = AppState::new(store.clone(), notifier.clone(), rules.booking_rules(), signal).with_db(db);

    match &config.redis {
        Some(redis) => match RedisClient::new(&redis.url).await {
            Ok(client) => state = state.with_rate_limit(Arc::new(client), rules.rate_limit_per_minute),
            Err(e) => tracing::warn!("Redis unavailable, rate limiting disabled: {}", e),
        },
        None => tracing::info!("No Redis configured, rate limiting disabled"),
    }

    tokio::spawn(worker::start_rebalance_worker(rebalance_rx, state.trips.clone()));
    tokio::spawn(worker::start_license_worker(
        LicenseMonitor::new(store, notifier),
        Duration::from_secs(rules.license_check_interval_hours.max(1) * 3600),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
