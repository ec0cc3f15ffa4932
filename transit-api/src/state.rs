use std::sync::Arc;

use transit_booking::{RebalanceSignal, RewardsService, TicketService, TripService};
use transit_core::{BookingRules, BookingStore, Notifier};
use transit_store::{DbClient, RedisClient};

#[derive(Clone)]
pub struct AppState {
    pub tickets: Arc<TicketService>,
    pub trips: Arc<TripService>,
    pub rewards: Arc<RewardsService>,
    /// Pinged by `/health` when present.
    pub db: Option<Arc<DbClient>>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit_per_minute: i64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        rules: BookingRules,
        signal: RebalanceSignal,
    ) -> Self {
        Self {
            tickets: Arc::new(TicketService::new(store.clone(), notifier.clone(), rules.clone(), signal.clone())),
            trips: Arc::new(TripService::new(store.clone(), notifier, rules, signal)),
            rewards: Arc::new(RewardsService::new(store)),
            db: None,
            redis: None,
            rate_limit_per_minute: 120,
        }
    }

    pub fn with_db(mut self, db: Arc<DbClient>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, per_minute: i64) -> Self {
        self.redis = Some(redis);
        self.rate_limit_per_minute = per_minute;
        self
    }
}
