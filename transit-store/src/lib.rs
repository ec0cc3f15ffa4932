pub mod app_config;
pub mod database;
pub mod memory;
pub mod notifier;
pub mod pg_store;
pub mod redis_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use memory::{MemoryStore, RecordingNotifier};
pub use notifier::Dispatcher;
pub use pg_store::PgBookingStore;
pub use redis_repo::RedisClient;
