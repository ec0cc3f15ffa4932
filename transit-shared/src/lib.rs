pub mod models;
pub mod pii;

pub use models::events::{RebalanceReason, RebalanceRequested};
pub use pii::Masked;
