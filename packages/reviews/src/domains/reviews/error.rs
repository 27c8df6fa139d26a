use thiserror::Error;
use uuid::Uuid;

use crate::common::RequestId;

use super::models::review_request::ReviewRequest;
use super::models::review_slot::ReviewSlot;

/// Errors surfaced by review-slot operations.
///
/// Every operation either commits its transition (plus the aggregate-counter
/// update) atomically or returns one of these and rolls back entirely.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// Malformed input, rejected before any row lock is taken.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The operation is not valid for the entity's current status.
    #[error("Cannot {operation} {entity} {id}: status is {status}")]
    StateConflict {
        entity: &'static str,
        id: Uuid,
        status: String,
        operation: &'static str,
    },

    /// The referenced slot or request does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// The actor is not allowed to perform this operation.
    #[error("Permission denied: {0}")]
    Permission(String),

    /// No AVAILABLE slot remains on the request (including claim-race losers).
    #[error("No available slots on request {0}")]
    NoSlotsAvailable(RequestId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReviewError {
    pub(crate) fn slot_conflict(slot: &ReviewSlot, operation: &'static str) -> Self {
        ReviewError::StateConflict {
            entity: "slot",
            id: slot.id.into_uuid(),
            status: slot.status.to_string(),
            operation,
        }
    }

    pub(crate) fn request_conflict(request: &ReviewRequest, operation: &'static str) -> Self {
        ReviewError::StateConflict {
            entity: "request",
            id: request.id.into_uuid(),
            status: request.status.to_string(),
            operation,
        }
    }

    pub(crate) fn slot_not_found(id: impl Into<Uuid>) -> Self {
        ReviewError::NotFound {
            kind: "slot",
            id: id.into(),
        }
    }

    pub(crate) fn request_not_found(id: impl Into<Uuid>) -> Self {
        ReviewError::NotFound {
            kind: "request",
            id: id.into(),
        }
    }

    /// True for errors the sweeper treats as "already handled" rather than
    /// failures (a slot that transitioned between scan and lock).
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, ReviewError::StateConflict { .. })
    }
}
