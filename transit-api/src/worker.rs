use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use transit_booking::{LicenseMonitor, TripService};
use transit_shared::RebalanceRequested;

/// Runs the licence check once at start-up and then every `period`.
pub async fn start_license_worker(monitor: LicenseMonitor, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("License worker started, checking every {:?}", period);

    loop {
        ticker.tick().await;
        match monitor.check_license_expiry(Utc::now().date_naive()).await {
            Ok(suspended) if suspended.is_empty() => {}
            Ok(suspended) => info!("Suspended {} drivers with expired licenses", suspended.len()),
            Err(e) => error!("License check failed: {}", e),
        }
    }
}

/// Drains rebalance requests raised by bookings and trip scheduling. Stops
/// when every sender is gone.
pub async fn start_rebalance_worker(mut rx: UnboundedReceiver<RebalanceRequested>, trips: Arc<TripService>) {
    info!("Rebalance worker started");

    while let Some(event) = rx.recv().await {
        info!(
            route_id = %event.route_id,
            reason = ?event.reason,
            "Processing rebalance request"
        );
        if let Err(e) = trips.rebalance_route(event.route_id).await {
            error!(route_id = %event.route_id, "Rebalance failed: {}", e);
        }
    }

    info!("Rebalance worker stopped");
}
