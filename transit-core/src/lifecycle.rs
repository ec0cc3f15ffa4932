use crate::models::{TicketStatus, TripStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid state transition from {from} to {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

impl TransitionError {
    fn new(from: impl ToString, to: impl ToString) -> Self {
        Self { from: from.to_string(), to: to.to_string() }
    }
}

impl TripStatus {
    /// Legal trip moves. Saturation and rollover only touch pre-departure trips;
    /// operational events move a trip through embarkation to completion.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Scheduled, Available)
                | (Scheduled, FullyBooked)
                | (Scheduled, Embarked)
                | (Available, Scheduled)
                | (Available, FullyBooked)
                | (Available, Embarked)
                | (FullyBooked, Available)
                | (FullyBooked, Embarked)
                | (Embarked, EmbarkedNotToCapacity)
                | (Embarked, Completed)
                | (EmbarkedNotToCapacity, Embarked)
                | (EmbarkedNotToCapacity, Completed)
        )
    }

    pub fn transition(self, next: TripStatus) -> Result<TripStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new(self, next))
        }
    }
}

impl TicketStatus {
    /// pending → confirmed → cancelled, with pending → cancelled as a shortcut.
    /// Cancelled is terminal.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;

        self == next
            || matches!(
                (self, next),
                (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled)
            )
    }

    pub fn transition(self, next: TicketStatus) -> Result<TicketStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new(self, next))
        }
    }
}
