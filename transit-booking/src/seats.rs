//! Per-trip seat ledger. Every state change goes through the store's
//! conditional updates; nothing here reads a seat and then writes it back.

use tracing::debug;
use uuid::Uuid;

use transit_core::{BookingTx, Seat, SeatState};

use crate::error::BookingError;

/// `ST01`, `ST02`, ... padded to at least two digits.
pub fn seat_labels(capacity: i32) -> Vec<String> {
    let capacity = capacity.max(0) as usize;
    let width = capacity.to_string().len().max(2);
    (1..=capacity).map(|n| format!("ST{:0width$}", n, width = width)).collect()
}

pub async fn create_seats(
    tx: &mut dyn BookingTx,
    trip_id: Uuid,
    capacity: i32,
) -> Result<Vec<Seat>, BookingError> {
    let seats: Vec<Seat> = seat_labels(capacity)
        .into_iter()
        .map(|seat_number| Seat { trip_id, seat_number, state: SeatState::Available })
        .collect();
    tx.insert_seats(&seats).await?;
    debug!(%trip_id, count = seats.len(), "Seat ledger created");
    Ok(seats)
}

pub async fn reserve(tx: &mut dyn BookingTx, trip_id: Uuid, seat_number: &str) -> Result<(), BookingError> {
    if tx.reserve_seat(trip_id, seat_number).await? {
        Ok(())
    } else {
        Err(BookingError::SeatUnavailable(seat_number.to_string()))
    }
}

/// Returns whether the seat existed.
pub async fn release(tx: &mut dyn BookingTx, trip_id: Uuid, seat_number: &str) -> Result<bool, BookingError> {
    Ok(tx.release_seat(trip_id, seat_number).await?)
}

/// Drops the ledger and builds a fresh one. Existing reservations are lost.
pub async fn recreate_for_capacity(
    tx: &mut dyn BookingTx,
    trip_id: Uuid,
    capacity: i32,
) -> Result<Vec<Seat>, BookingError> {
    let removed = tx.delete_seats(trip_id).await?;
    debug!(%trip_id, removed, capacity, "Recreating seat ledger");
    create_seats(tx, trip_id, capacity).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use transit_core::BookingStore;
    use transit_store::memory::MemoryStore;

    #[test]
    fn labels_are_zero_padded() {
        let labels = seat_labels(12);
        assert_eq!(labels.first().map(String::as_str), Some("ST01"));
        assert_eq!(labels.last().map(String::as_str), Some("ST12"));
        assert_eq!(seat_labels(120)[0], "ST001");
        assert!(seat_labels(0).is_empty());
    }

    #[tokio::test]
    async fn ledger_matches_capacity_with_unique_labels() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();

        let seats = create_seats(&mut *tx, trip_id, 30).await.unwrap();
        assert_eq!(seats.len(), 30);
        let unique: HashSet<_> = seats.iter().map(|s| s.seat_number.clone()).collect();
        assert_eq!(unique.len(), 30);
        assert!(seats.iter().all(|s| s.state == SeatState::Available));
    }

    #[tokio::test]
    async fn second_reservation_of_a_seat_fails() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        create_seats(&mut *tx, trip_id, 2).await.unwrap();

        reserve(&mut *tx, trip_id, "ST01").await.unwrap();
        let err = reserve(&mut *tx, trip_id, "ST01").await.unwrap_err();
        assert!(matches!(err, BookingError::SeatUnavailable(ref s) if s == "ST01"));

        assert!(release(&mut *tx, trip_id, "ST01").await.unwrap());
        reserve(&mut *tx, trip_id, "ST01").await.unwrap();
        assert!(!release(&mut *tx, trip_id, "ST77").await.unwrap());
    }

    #[tokio::test]
    async fn recreate_discards_reservations() {
        let store = MemoryStore::new();
        let trip_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        create_seats(&mut *tx, trip_id, 4).await.unwrap();
        reserve(&mut *tx, trip_id, "ST02").await.unwrap();

        let seats = recreate_for_capacity(&mut *tx, trip_id, 6).await.unwrap();
        assert_eq!(seats.len(), 6);
        let stored = tx.list_seats(trip_id).await.unwrap();
        assert_eq!(stored.len(), 6);
        assert!(stored.iter().all(|s| s.state == SeatState::Available));
    }
}
