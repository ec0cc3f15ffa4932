use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, warn};

use transit_core::{BookingStore, Driver, DriverStatus, Notifier, UserRole};

use crate::error::BookingError;
use crate::notices::Outbox;
use crate::signal::RebalanceSignal;

/// Suspends drivers whose licence has lapsed and tells them and the office.
pub struct LicenseMonitor {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
}

impl LicenseMonitor {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Returns the drivers suspended by this run.
    pub async fn check_license_expiry(&self, today: NaiveDate) -> Result<Vec<Driver>, BookingError> {
        let mut tx = self.store.begin().await?;
        let expired = tx.list_expired_licenses(today).await?;
        if expired.is_empty() {
            return Ok(expired);
        }

        let office = tx.list_users_by_role(&[UserRole::Admin, UserRole::Staff]).await?;
        let mut outbox = Outbox::new();
        let mut suspended = Vec::with_capacity(expired.len());

        for mut driver in expired {
            tx.set_driver_status(driver.id, DriverStatus::Suspended).await?;
            driver.status = DriverStatus::Suspended;

            let expiry = driver
                .license_expiry
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let name = match tx.get_user(driver.user_id).await? {
                Some(user) => {
                    outbox.notify(
                        user.id,
                        "License Expired - Suspension",
                        format!(
                            "Your driver license expired on {}. You have been suspended until a valid license is provided.",
                            expiry
                        ),
                    );
                    user.name
                }
                None => {
                    warn!(driver_id = %driver.id, "Suspended driver has no user account");
                    driver.license_number.clone()
                }
            };

            let alert = format!(
                "Driver {} (Driver No: {}) has been suspended due to an expired license.",
                name,
                driver.driver_no.as_deref().unwrap_or("N/A")
            );
            for member in &office {
                outbox.notify(member.id, "Driver License Expiry Alert", alert.clone());
            }
            suspended.push(driver);
        }
        tx.commit().await?;

        info!(count = suspended.len(), %today, "Drivers suspended for expired licenses");
        outbox.flush(self.notifier.as_ref(), &RebalanceSignal::disabled()).await;
        Ok(suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use transit_store::memory::Delivery;
    use uuid::Uuid;

    #[tokio::test]
    async fn expired_driver_is_suspended_and_office_alerted() {
        let fx = Fixture::new(4).await;
        let admin = fx.add_user("Esi Admin", UserRole::Admin, None).await;
        let staff = fx.add_user("Kojo Staff", UserRole::Staff, None).await;
        let lapsed_user = fx.add_user("Kofi Driver", UserRole::Driver, None).await;
        let lapsed = Driver {
            id: Uuid::new_v4(),
            user_id: lapsed_user.id,
            driver_no: Some("DRV-12".to_string()),
            license_number: "GH-LIC-0012".to_string(),
            license_expiry: NaiveDate::from_ymd_opt(2026, 1, 31),
            status: DriverStatus::Active,
        };
        fx.store.insert_driver(lapsed.clone()).await;

        let monitor = LicenseMonitor::new(fx.store(), fx.notifier());
        let today = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let suspended = monitor.check_license_expiry(today).await.unwrap();

        assert_eq!(suspended.len(), 1);
        assert_eq!(suspended[0].id, lapsed.id);
        assert_eq!(fx.store.driver(lapsed.id).await.unwrap().status, DriverStatus::Suspended);
        assert_eq!(fx.store.driver(fx.driver.id).await.unwrap().status, DriverStatus::Active);

        let deliveries = fx.notifier.deliveries();
        assert!(deliveries.iter().any(|d| matches!(
            d,
            Delivery::Notification { user_id, subject, .. }
                if *user_id == lapsed_user.id && subject == "License Expired - Suspension"
        )));
        for member in [admin.id, staff.id] {
            assert!(deliveries.iter().any(|d| matches!(
                d,
                Delivery::Notification { user_id, message, .. }
                    if *user_id == member
                        && message == "Driver Kofi Driver (Driver No: DRV-12) has been suspended due to an expired license."
            )));
        }

        // A second run finds nobody new.
        assert!(monitor.check_license_expiry(today).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn licence_expiring_today_is_still_valid() {
        let fx = Fixture::new(4).await;
        let mut driver = fx.driver.clone();
        driver.license_expiry = NaiveDate::from_ymd_opt(2026, 2, 1);
        fx.store.insert_driver(driver.clone()).await;

        let monitor = LicenseMonitor::new(fx.store(), fx.notifier());
        let suspended = monitor
            .check_license_expiry(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap())
            .await
            .unwrap();
        assert!(suspended.is_empty());
    }
}
