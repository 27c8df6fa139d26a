//! The single guarded transactional apply path.
//!
//! Every slot operation - user-facing claim/submit/accept/reject, admin
//! dispute resolution, and sweeper-driven expiries - funnels through
//! `apply_event`. Lock order is always the request row first, then the slot
//! row, which totally orders transitions per slot by commit order and rules
//! out deadlocks between the claim variants and the sweeper.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, warn};

use crate::common::{RequestId, SlotId};

use super::error::ReviewError;
use super::escrow::EscrowBridge;
use super::events::NotificationService;
use super::machines::slot_machine::{self, AggregateDelta, EffectIntent, EscrowAction, SlotEvent};
use super::machines::Transition;
use super::models::review_request::{RequestStatus, ReviewRequest};
use super::models::review_slot::ReviewSlot;

/// Which slot an event targets.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SlotTarget {
    /// A specific slot, locked with `FOR UPDATE`.
    Slot(SlotId),
    /// Any AVAILABLE slot on the request, picked with
    /// `FOR UPDATE SKIP LOCKED` (claim-by-request-id).
    AvailableIn(RequestId),
}

/// Apply one event to one slot in one transaction.
///
/// Sequence: validate payload (no lock), lock request row, resolve and lock
/// slot row, run the pure state machine, persist slot + aggregate delta,
/// commit, then execute post-commit intents (escrow, notifications). Any
/// error before commit rolls the whole transaction back; post-commit effect
/// failures are logged and never undo the committed transition.
pub(crate) async fn apply_event(
    pool: &PgPool,
    escrow: &dyn EscrowBridge,
    notifier: &dyn NotificationService,
    target: SlotTarget,
    event: SlotEvent,
) -> Result<ReviewSlot, ReviewError> {
    slot_machine::validate(&event)?;

    // Resolve the owning request before locking anything, so both claim
    // variants take locks in the same order.
    let request_id = match target {
        SlotTarget::AvailableIn(request_id) => request_id,
        SlotTarget::Slot(slot_id) => {
            ReviewSlot::find_by_id(slot_id, pool)
                .await?
                .ok_or_else(|| ReviewError::slot_not_found(slot_id))?
                .request_id
        }
    };

    let mut tx = pool.begin().await?;

    let request = ReviewRequest::lock_by_id(request_id, &mut *tx)
        .await?
        .ok_or_else(|| ReviewError::request_not_found(request_id))?;

    let slot = match target {
        SlotTarget::Slot(slot_id) => ReviewSlot::lock_by_id(slot_id, &mut *tx)
            .await?
            .ok_or_else(|| ReviewError::slot_not_found(slot_id))?,
        SlotTarget::AvailableIn(request_id) => {
            ReviewSlot::lock_available_for_request(request_id, &mut *tx)
                .await?
                .ok_or(ReviewError::NoSlotsAvailable(request_id))?
        }
    };

    let transition = slot_machine::apply(&slot, &request, event, Utc::now())?;

    transition.slot.update(&mut *tx).await?;

    let deltas = transition.aggregate_deltas();
    if !deltas.is_empty() {
        let mut updated = request;
        for delta in deltas {
            apply_delta(&mut updated, delta);
        }
        updated.update_counters(&mut *tx).await?;
    }

    tx.commit().await?;

    run_post_commit_effects(escrow, notifier, &transition).await;

    Ok(transition.slot)
}

/// Fold a counter delta into the locked request row, flipping status at the
/// documented thresholds.
fn apply_delta(request: &mut ReviewRequest, delta: AggregateDelta) {
    match delta {
        AggregateDelta::ClaimedInc => {
            request.reviews_claimed += 1;
            // First claim opens the review phase.
            if request.status == RequestStatus::Pending {
                request.status = RequestStatus::InReview;
            }
        }
        AggregateDelta::ClaimedDec => {
            request.reviews_claimed -= 1;
            // Only an empty request reverts to pending.
            if request.reviews_claimed == 0 && request.status == RequestStatus::InReview {
                request.status = RequestStatus::Pending;
            }
        }
        AggregateDelta::CompletedInc => {
            request.reviews_completed += 1;
            if request.reviews_completed == request.reviews_requested {
                request.status = RequestStatus::Completed;
            }
        }
    }
}

/// Execute escrow and notification intents for a committed transition.
async fn run_post_commit_effects(
    escrow: &dyn EscrowBridge,
    notifier: &dyn NotificationService,
    transition: &Transition,
) {
    for intent in &transition.effects {
        match intent {
            EffectIntent::Aggregate(_) => {}
            EffectIntent::Escrow(action) => {
                let result = match action {
                    EscrowAction::Release => escrow.release(&transition.slot).await,
                    EscrowAction::Refund => escrow.refund(&transition.slot).await,
                };
                // Reconciliation of failed payment calls is the payment
                // collaborator's concern; the slot state stands.
                match result {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        slot_id = %transition.slot.id,
                        action = ?action,
                        "escrow call was declined"
                    ),
                    Err(e) => error!(
                        slot_id = %transition.slot.id,
                        action = ?action,
                        error = %e,
                        "escrow call failed"
                    ),
                }
            }
            EffectIntent::Notify(event) => notifier.publish(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MemberId;
    use crate::domains::reviews::models::review_request::ReviewKind;
    use rust_decimal::Decimal;

    fn request(status: RequestStatus, claimed: i32, completed: i32) -> ReviewRequest {
        ReviewRequest {
            id: RequestId::new(),
            owner_id: MemberId::new(),
            content_type: "article".to_string(),
            review_kind: ReviewKind::Free,
            status,
            reviews_requested: 2,
            reviews_claimed: claimed,
            reviews_completed: completed,
            budget: Decimal::ZERO,
            deadline: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_claim_opens_review_phase() {
        let mut req = request(RequestStatus::Pending, 0, 0);
        apply_delta(&mut req, AggregateDelta::ClaimedInc);
        assert_eq!(req.reviews_claimed, 1);
        assert_eq!(req.status, RequestStatus::InReview);

        apply_delta(&mut req, AggregateDelta::ClaimedInc);
        assert_eq!(req.reviews_claimed, 2);
        assert_eq!(req.status, RequestStatus::InReview);
    }

    #[test]
    fn claimed_returning_to_zero_reverts_to_pending() {
        let mut req = request(RequestStatus::InReview, 2, 0);
        apply_delta(&mut req, AggregateDelta::ClaimedDec);
        assert_eq!(req.status, RequestStatus::InReview);

        apply_delta(&mut req, AggregateDelta::ClaimedDec);
        assert_eq!(req.reviews_claimed, 0);
        assert_eq!(req.status, RequestStatus::Pending);
    }

    #[test]
    fn full_completion_marks_request_completed() {
        let mut req = request(RequestStatus::InReview, 2, 1);
        apply_delta(&mut req, AggregateDelta::CompletedInc);
        assert_eq!(req.reviews_completed, 2);
        assert_eq!(req.status, RequestStatus::Completed);
    }
}
