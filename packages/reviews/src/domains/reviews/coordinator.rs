//! ClaimCoordinator - the operation surface for creators and reviewers.
//!
//! Each method builds a `SlotEvent` and hands it to the unified transactional
//! apply path in `ops`; claim-by-request-id and claim-by-slot-id differ only
//! in how the target slot row is resolved and locked.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;
use tracing::info;

use crate::common::{MemberId, RequestId, SlotId};

use super::error::ReviewError;
use super::escrow::EscrowBridge;
use super::events::NotificationService;
use super::machines::slot_machine::Acceptor;
use super::machines::SlotEvent;
use super::models::review_request::{RequestStatus, ReviewKind, ReviewRequest};
use super::models::review_slot::{RejectionReason, ReviewSlot};
use super::ops::{self, SlotTarget};

pub use super::machines::SubmitReview;

/// How a claimer names the slot they want.
#[derive(Debug, Clone, Copy)]
pub enum ClaimTarget {
    /// "Give me any open slot on this request."
    Request(RequestId),
    /// "Give me this exact slot."
    Slot(SlotId),
}

/// Input for publishing a new review request.
#[derive(Debug, Clone)]
pub struct NewReviewRequest {
    pub owner_id: MemberId,
    pub content_type: String,
    pub review_kind: ReviewKind,
    pub reviews_requested: i32,
    pub budget: Decimal,
    pub deadline: Option<DateTime<Utc>>,
}

/// Coordinates slot claims and the reviewer/owner lifecycle operations.
///
/// Safe to clone and share across handlers; all serialization happens in the
/// database through row locks, never in process memory.
#[derive(Clone)]
pub struct ClaimCoordinator {
    pool: PgPool,
    escrow: Arc<dyn EscrowBridge>,
    notifier: Arc<dyn NotificationService>,
}

impl ClaimCoordinator {
    pub fn new(
        pool: PgPool,
        escrow: Arc<dyn EscrowBridge>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            pool,
            escrow,
            notifier,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Publish a review request: insert the parent row in PENDING and
    /// batch-create its N AVAILABLE slots in the same transaction.
    pub async fn publish(&self, input: NewReviewRequest) -> Result<ReviewRequest, ReviewError> {
        if input.reviews_requested < 1 {
            return Err(ReviewError::Validation(
                "a request needs at least one review slot".to_string(),
            ));
        }
        if input.budget < Decimal::ZERO {
            return Err(ReviewError::Validation(
                "budget must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let request = ReviewRequest {
            id: RequestId::new(),
            owner_id: input.owner_id,
            content_type: input.content_type,
            review_kind: input.review_kind,
            status: RequestStatus::Pending,
            reviews_requested: input.reviews_requested,
            reviews_claimed: 0,
            reviews_completed: 0,
            budget: input.budget,
            deadline: input.deadline,
            created_at: now,
            updated_at: now,
        };

        let amounts = match request.review_kind {
            ReviewKind::Expert => split_budget(request.budget, request.reviews_requested),
            ReviewKind::Free => vec![Decimal::ZERO; request.reviews_requested as usize],
        };

        let mut tx = self.pool.begin().await?;
        request.insert(&mut *tx).await?;
        let slot_ids = ReviewSlot::insert_batch(request.id, &amounts, &mut *tx).await?;
        tx.commit().await?;

        info!(
            request_id = %request.id,
            slots = slot_ids.len(),
            kind = ?request.review_kind,
            "review request published"
        );

        Ok(request)
    }

    /// Claim a slot for `reviewer_id`.
    ///
    /// Of K concurrent attempts against the last open slot, exactly one
    /// commits; the rest see `NoSlotsAvailable` (by-request) or
    /// `StateConflict` (by-slot).
    pub async fn claim(
        &self,
        target: ClaimTarget,
        reviewer_id: MemberId,
    ) -> Result<ReviewSlot, ReviewError> {
        let slot_target = match target {
            ClaimTarget::Request(request_id) => SlotTarget::AvailableIn(request_id),
            ClaimTarget::Slot(slot_id) => SlotTarget::Slot(slot_id),
        };
        self.apply(slot_target, SlotEvent::Claim { reviewer_id })
            .await
    }

    /// Release a claim the reviewer no longer wants to fulfil.
    pub async fn unclaim(
        &self,
        slot_id: SlotId,
        reviewer_id: MemberId,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(SlotTarget::Slot(slot_id), SlotEvent::Unclaim { reviewer_id })
            .await
    }

    /// Submit the review for a claimed slot.
    pub async fn submit(
        &self,
        slot_id: SlotId,
        reviewer_id: MemberId,
        review: SubmitReview,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(
            SlotTarget::Slot(slot_id),
            SlotEvent::Submit {
                reviewer_id,
                review,
            },
        )
        .await
    }

    /// Owner accepts a submitted review.
    pub async fn accept(
        &self,
        slot_id: SlotId,
        owner_id: MemberId,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(
            SlotTarget::Slot(slot_id),
            SlotEvent::Accept {
                accepted_by: Acceptor::Owner(owner_id),
            },
        )
        .await
    }

    /// Owner rejects a submitted review.
    pub async fn reject(
        &self,
        slot_id: SlotId,
        owner_id: MemberId,
        reason: RejectionReason,
        notes: Option<String>,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(
            SlotTarget::Slot(slot_id),
            SlotEvent::Reject {
                owner_id,
                reason,
                notes,
            },
        )
        .await
    }

    /// Owner asks the reviewer to expand on their review (max two rounds).
    pub async fn request_elaboration(
        &self,
        slot_id: SlotId,
        owner_id: MemberId,
        message: String,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(
            SlotTarget::Slot(slot_id),
            SlotEvent::RequestElaboration { owner_id, message },
        )
        .await
    }

    /// Reviewer answers an elaboration request; restarts the auto-accept
    /// window.
    pub async fn respond_elaboration(
        &self,
        slot_id: SlotId,
        reviewer_id: MemberId,
        response: String,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(
            SlotTarget::Slot(slot_id),
            SlotEvent::RespondElaboration {
                reviewer_id,
                response,
            },
        )
        .await
    }

    /// Reviewer appeals a rejection (within 7 days of the rejection).
    pub async fn open_dispute(
        &self,
        slot_id: SlotId,
        reviewer_id: MemberId,
        reason: String,
    ) -> Result<ReviewSlot, ReviewError> {
        self.apply(
            SlotTarget::Slot(slot_id),
            SlotEvent::OpenDispute {
                reviewer_id,
                reason,
            },
        )
        .await
    }

    pub(crate) async fn apply(
        &self,
        target: SlotTarget,
        event: SlotEvent,
    ) -> Result<ReviewSlot, ReviewError> {
        ops::apply_event(
            &self.pool,
            self.escrow.as_ref(),
            self.notifier.as_ref(),
            target,
            event,
        )
        .await
    }
}

/// Split the budget into per-slot amounts at cent precision.
///
/// The first slot absorbs the sub-cent remainder, so the amounts always sum
/// to the full budget.
fn split_budget(budget: Decimal, count: i32) -> Vec<Decimal> {
    let per_slot =
        (budget / Decimal::from(count)).round_dp_with_strategy(2, RoundingStrategy::ToZero);
    let remainder = budget - per_slot * Decimal::from(count);

    let mut amounts = vec![per_slot; count as usize];
    amounts[0] += remainder;
    amounts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uneven_budget_remainder_lands_on_one_slot() {
        let amounts = split_budget(Decimal::from(100), 3);
        assert_eq!(
            amounts,
            vec![
                Decimal::new(3334, 2),
                Decimal::new(3333, 2),
                Decimal::new(3333, 2),
            ]
        );
        assert_eq!(amounts.iter().sum::<Decimal>(), Decimal::from(100));
    }

    #[test]
    fn even_budget_splits_evenly() {
        let amounts = split_budget(Decimal::from(90), 3);
        assert_eq!(amounts, vec![Decimal::from(30); 3]);
    }

    #[test]
    fn single_slot_takes_the_whole_budget() {
        assert_eq!(
            split_budget(Decimal::new(1999, 2), 1),
            vec![Decimal::new(1999, 2)]
        );
    }
}
