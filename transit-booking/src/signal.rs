use tokio::sync::mpsc;
use tracing::{debug, warn};
use transit_shared::RebalanceRequested;

/// Sending half of the rebalance queue. A disabled signal drops requests,
/// which is what tests and one-off tools want.
#[derive(Clone, Default)]
pub struct RebalanceSignal {
    tx: Option<mpsc::UnboundedSender<RebalanceRequested>>,
}

impl RebalanceSignal {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RebalanceRequested>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn raise(&self, event: RebalanceRequested) {
        match &self.tx {
            Some(tx) => {
                if let Err(e) = tx.send(event) {
                    warn!(route_id = %e.0.route_id, "Rebalance worker is not running; request dropped");
                }
            }
            None => debug!(route_id = %event.route_id, reason = ?event.reason, "Rebalance signal disabled"),
        }
    }
}
