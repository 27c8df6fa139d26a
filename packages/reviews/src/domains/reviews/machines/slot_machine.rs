//! Slot State Machine - pure transition logic for review slots.
//!
//! `apply` takes the current slot, its parent request, an event, and a clock
//! value, and returns the updated slot plus a list of side-effect intents.
//! It performs no I/O; the transactional apply path in `ops` executes the
//! intents (aggregate deltas inside the transaction, escrow and notification
//! intents after commit).
//!
//! Transition table (initial: AVAILABLE; terminal: ACCEPTED, ABANDONED):
//!
//! ```text
//! AVAILABLE             --claim--------------------> CLAIMED
//! CLAIMED               --unclaim------------------> AVAILABLE
//! CLAIMED               --submit-------------------> SUBMITTED
//! CLAIMED               --claim deadline expiry----> ABANDONED
//! SUBMITTED             --accept (owner or auto)---> ACCEPTED
//! SUBMITTED             --reject-------------------> REJECTED
//! SUBMITTED             --request elaboration------> ELABORATION_REQUESTED
//! ELABORATION_REQUESTED --respond------------------> SUBMITTED
//! ELABORATION_REQUESTED --elaboration expiry-------> SUBMITTED
//! REJECTED              --dispute (within 7d)------> DISPUTED
//! DISPUTED              --admin resolve (accept)---> ACCEPTED
//! DISPUTED              --admin resolve (uphold)---> REJECTED
//! ```

use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;

use crate::common::MemberId;

use super::super::error::ReviewError;
use super::super::events::ReviewEvent;
use super::super::models::review_request::{RequestStatus, ReviewRequest};
use super::super::models::review_slot::{
    DisputeResolution, PaymentStatus, RejectionReason, ReviewSlot, SlotStatus,
};

// ============================================================================
// Time windows and validation limits
// ============================================================================

/// How long a reviewer has to submit after claiming.
pub const CLAIM_WINDOW_HOURS: i64 = 72;

/// Grace period before a submitted review auto-accepts.
pub const AUTO_ACCEPT_DAYS: i64 = 7;

/// How long a reviewer has to answer an elaboration request.
pub const ELABORATION_WINDOW_DAYS: i64 = 7;

/// How long after rejection a reviewer may open a dispute.
pub const DISPUTE_WINDOW_DAYS: i64 = 7;

pub const MIN_REVIEW_TEXT_CHARS: usize = 50;
pub const MIN_ELABORATION_CHARS: usize = 20;
pub const MIN_DISPUTE_REASON_CHARS: usize = 20;
pub const MAX_ELABORATION_ROUNDS: i32 = 2;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

// ============================================================================
// Events
// ============================================================================

/// Review content submitted by a reviewer.
#[derive(Debug, Clone)]
pub struct SubmitReview {
    pub text: String,
    pub rating: i32,
    pub attachments: Vec<String>,
}

/// Who triggered an accept.
#[derive(Debug, Clone, Copy)]
pub enum Acceptor {
    Owner(MemberId),
    /// Sweeper-driven accept at/after `auto_accept_at`.
    Auto,
}

/// An operation applied to a single slot.
#[derive(Debug, Clone)]
pub enum SlotEvent {
    Claim {
        reviewer_id: MemberId,
    },
    Unclaim {
        reviewer_id: MemberId,
    },
    Submit {
        reviewer_id: MemberId,
        review: SubmitReview,
    },
    /// Sweeper-driven: claim deadline passed without a submission.
    ExpireClaim,
    Accept {
        accepted_by: Acceptor,
    },
    Reject {
        owner_id: MemberId,
        reason: RejectionReason,
        notes: Option<String>,
    },
    RequestElaboration {
        owner_id: MemberId,
        message: String,
    },
    RespondElaboration {
        reviewer_id: MemberId,
        response: String,
    },
    /// Sweeper-driven: elaboration deadline passed; the original submission
    /// stands and the auto-accept clock restarts.
    ExpireElaboration,
    OpenDispute {
        reviewer_id: MemberId,
        reason: String,
    },
    /// Admin-only; the caller boundary enforces the admin check.
    ResolveDispute {
        resolution: DisputeResolution,
        notes: Option<String>,
    },
}

impl SlotEvent {
    /// Operation name used in errors and logs.
    pub fn operation(&self) -> &'static str {
        match self {
            SlotEvent::Claim { .. } => "claim",
            SlotEvent::Unclaim { .. } => "unclaim",
            SlotEvent::Submit { .. } => "submit",
            SlotEvent::ExpireClaim => "expire claim",
            SlotEvent::Accept { .. } => "accept",
            SlotEvent::Reject { .. } => "reject",
            SlotEvent::RequestElaboration { .. } => "request elaboration on",
            SlotEvent::RespondElaboration { .. } => "respond to elaboration on",
            SlotEvent::ExpireElaboration => "expire elaboration",
            SlotEvent::OpenDispute { .. } => "dispute",
            SlotEvent::ResolveDispute { .. } => "resolve dispute on",
        }
    }
}

// ============================================================================
// Transition output
// ============================================================================

/// Change to the parent aggregate's counters, applied in the same
/// transaction as the slot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateDelta {
    ClaimedInc,
    ClaimedDec,
    CompletedInc,
}

/// Payment action to run after commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    Release,
    Refund,
}

/// A side effect the caller must execute.
#[derive(Debug, Clone)]
pub enum EffectIntent {
    /// Executed inside the owning transaction.
    Aggregate(AggregateDelta),
    /// Executed after commit; failures are logged, never rolled back.
    Escrow(EscrowAction),
    /// Executed after commit.
    Notify(ReviewEvent),
}

/// Result of a successful transition: the new slot plus its effect intents.
#[derive(Debug, Clone)]
pub struct Transition {
    pub slot: ReviewSlot,
    pub effects: Vec<EffectIntent>,
}

impl Transition {
    pub fn aggregate_deltas(&self) -> Vec<AggregateDelta> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                EffectIntent::Aggregate(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn escrow_action(&self) -> Option<EscrowAction> {
        self.effects.iter().find_map(|e| match e {
            EffectIntent::Escrow(a) => Some(*a),
            _ => None,
        })
    }

    pub fn notifications(&self) -> Vec<&ReviewEvent> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                EffectIntent::Notify(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Validation (payload-only, runs before any lock is taken)
// ============================================================================

/// Check event payloads without looking at slot state.
///
/// The coordinator calls this before opening a transaction; `apply` calls it
/// again so the machine stands alone.
pub fn validate(event: &SlotEvent) -> Result<(), ReviewError> {
    match event {
        SlotEvent::Submit { review, .. } => {
            if review.text.chars().count() < MIN_REVIEW_TEXT_CHARS {
                return Err(ReviewError::Validation(format!(
                    "review text must be at least {MIN_REVIEW_TEXT_CHARS} characters"
                )));
            }
            if review.rating < MIN_RATING || review.rating > MAX_RATING {
                return Err(ReviewError::Validation(format!(
                    "rating must be between {MIN_RATING} and {MAX_RATING}"
                )));
            }
            Ok(())
        }
        SlotEvent::Reject { reason, notes, .. } => {
            if *reason == RejectionReason::Other
                && notes.as_deref().map_or(true, |n| n.trim().is_empty())
            {
                return Err(ReviewError::Validation(
                    "rejection notes are required when the reason is 'other'".to_string(),
                ));
            }
            Ok(())
        }
        SlotEvent::RequestElaboration { message, .. } => {
            if message.chars().count() < MIN_ELABORATION_CHARS {
                return Err(ReviewError::Validation(format!(
                    "elaboration request must be at least {MIN_ELABORATION_CHARS} characters"
                )));
            }
            Ok(())
        }
        SlotEvent::RespondElaboration { response, .. } => {
            if response.trim().is_empty() {
                return Err(ReviewError::Validation(
                    "elaboration response must not be empty".to_string(),
                ));
            }
            Ok(())
        }
        SlotEvent::OpenDispute { reason, .. } => {
            if reason.chars().count() < MIN_DISPUTE_REASON_CHARS {
                return Err(ReviewError::Validation(format!(
                    "dispute reason must be at least {MIN_DISPUTE_REASON_CHARS} characters"
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Apply `event` to `slot`, producing the updated slot and effect intents.
///
/// Pure: no I/O, no clock reads (`now` is an argument). Guards return
/// `StateConflict` / `Permission` / `Validation`; re-running an event against
/// an already-transitioned slot always fails its current-state precondition,
/// which is what makes sweeper reprocessing idempotent.
pub fn apply(
    slot: &ReviewSlot,
    request: &ReviewRequest,
    event: SlotEvent,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    validate(&event)?;

    match event {
        SlotEvent::Claim { reviewer_id } => claim(slot, request, reviewer_id, now),
        SlotEvent::Unclaim { reviewer_id } => unclaim(slot, reviewer_id),
        SlotEvent::Submit {
            reviewer_id,
            review,
        } => submit(slot, reviewer_id, review, now),
        SlotEvent::ExpireClaim => expire_claim(slot, now),
        SlotEvent::Accept { accepted_by } => accept(slot, request, accepted_by, now),
        SlotEvent::Reject {
            owner_id,
            reason,
            notes,
        } => reject(slot, request, owner_id, reason, notes, now),
        SlotEvent::RequestElaboration { owner_id, message } => {
            request_elaboration(slot, request, owner_id, message, now)
        }
        SlotEvent::RespondElaboration {
            reviewer_id,
            response,
        } => respond_elaboration(slot, reviewer_id, response, now),
        SlotEvent::ExpireElaboration => expire_elaboration(slot, now),
        SlotEvent::OpenDispute {
            reviewer_id,
            reason,
        } => open_dispute(slot, reviewer_id, reason, now),
        SlotEvent::ResolveDispute { resolution, notes } => {
            resolve_dispute(slot, resolution, notes, now)
        }
    }
}

fn claim(
    slot: &ReviewSlot,
    request: &ReviewRequest,
    reviewer_id: MemberId,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Available {
        return Err(ReviewError::slot_conflict(slot, "claim"));
    }
    if !matches!(
        request.status,
        RequestStatus::Pending | RequestStatus::InReview
    ) {
        return Err(ReviewError::request_conflict(request, "claim a slot on"));
    }
    if reviewer_id == request.owner_id {
        return Err(ReviewError::Permission(
            "cannot claim a slot on your own request".to_string(),
        ));
    }
    // Redundant with slot availability, but keeps the counter invariant
    // independent of slot-row consistency.
    if request.reviews_claimed >= request.reviews_requested {
        return Err(ReviewError::NoSlotsAvailable(request.id));
    }

    let mut next = slot.clone();
    next.status = SlotStatus::Claimed;
    next.reviewer_id = Some(reviewer_id);
    next.claimed_at = Some(now);
    next.claim_deadline = Some(now + Duration::hours(CLAIM_WINDOW_HOURS));

    Ok(Transition {
        effects: vec![
            EffectIntent::Aggregate(AggregateDelta::ClaimedInc),
            EffectIntent::Notify(ReviewEvent::SlotClaimed {
                slot_id: next.id,
                request_id: next.request_id,
                reviewer_id,
            }),
        ],
        slot: next,
    })
}

fn unclaim(slot: &ReviewSlot, reviewer_id: MemberId) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Claimed {
        return Err(ReviewError::slot_conflict(slot, "unclaim"));
    }
    check_reviewer(slot, reviewer_id, "unclaim")?;

    let mut next = slot.clone();
    next.status = SlotStatus::Available;
    next.reviewer_id = None;
    next.claimed_at = None;
    next.claim_deadline = None;

    Ok(Transition {
        effects: vec![EffectIntent::Aggregate(AggregateDelta::ClaimedDec)],
        slot: next,
    })
}

fn submit(
    slot: &ReviewSlot,
    reviewer_id: MemberId,
    review: SubmitReview,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Claimed {
        return Err(ReviewError::slot_conflict(slot, "submit"));
    }
    check_reviewer(slot, reviewer_id, "submit")?;
    match slot.claim_deadline {
        Some(deadline) if now < deadline => {}
        _ => return Err(ReviewError::slot_conflict(slot, "submit after deadline on")),
    }

    let mut next = slot.clone();
    next.status = SlotStatus::Submitted;
    next.review_text = Some(review.text);
    next.rating = Some(review.rating);
    next.attachments = Some(Json(review.attachments));
    next.submitted_at = Some(now);
    next.auto_accept_at = Some(now + Duration::days(AUTO_ACCEPT_DAYS));
    next.claim_deadline = None;

    Ok(Transition {
        effects: vec![EffectIntent::Notify(ReviewEvent::ReviewSubmitted {
            slot_id: next.id,
            request_id: next.request_id,
            reviewer_id,
        })],
        slot: next,
    })
}

fn expire_claim(slot: &ReviewSlot, now: DateTime<Utc>) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Claimed {
        return Err(ReviewError::slot_conflict(slot, "expire claim on"));
    }
    match slot.claim_deadline {
        Some(deadline) if now >= deadline => {}
        _ => return Err(ReviewError::slot_conflict(slot, "expire unexpired claim on")),
    }
    let reviewer_id = current_reviewer(slot, "expire claim on")?;

    let mut next = slot.clone();
    next.status = SlotStatus::Abandoned;
    next.reviewer_id = None;
    next.claimed_at = None;
    next.claim_deadline = None;

    Ok(Transition {
        effects: vec![
            EffectIntent::Aggregate(AggregateDelta::ClaimedDec),
            EffectIntent::Notify(ReviewEvent::SlotAbandoned {
                slot_id: next.id,
                request_id: next.request_id,
                reviewer_id,
            }),
        ],
        slot: next,
    })
}

fn accept(
    slot: &ReviewSlot,
    request: &ReviewRequest,
    accepted_by: Acceptor,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Submitted {
        return Err(ReviewError::slot_conflict(slot, "accept"));
    }
    let auto = match accepted_by {
        Acceptor::Owner(member_id) => {
            check_owner(request, member_id, "accept reviews on")?;
            false
        }
        Acceptor::Auto => {
            // Only valid once the grace window has elapsed.
            match slot.auto_accept_at {
                Some(at) if now >= at => {}
                _ => return Err(ReviewError::slot_conflict(slot, "auto-accept")),
            }
            true
        }
    };
    let reviewer_id = current_reviewer(slot, "accept")?;

    let mut next = slot.clone();
    next.status = SlotStatus::Accepted;
    next.reviewed_at = Some(now);
    next.auto_accept_at = None;

    let mut effects = vec![EffectIntent::Aggregate(AggregateDelta::CompletedInc)];
    if next.payment_status == PaymentStatus::Escrowed {
        next.payment_status = PaymentStatus::Released;
        effects.push(EffectIntent::Escrow(EscrowAction::Release));
    }
    effects.push(EffectIntent::Notify(ReviewEvent::ReviewAccepted {
        slot_id: next.id,
        request_id: next.request_id,
        reviewer_id,
        auto,
    }));

    Ok(Transition {
        effects,
        slot: next,
    })
}

fn reject(
    slot: &ReviewSlot,
    request: &ReviewRequest,
    owner_id: MemberId,
    reason: RejectionReason,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Submitted {
        return Err(ReviewError::slot_conflict(slot, "reject"));
    }
    check_owner(request, owner_id, "reject reviews on")?;
    let reviewer_id = current_reviewer(slot, "reject")?;

    let mut next = slot.clone();
    next.status = SlotStatus::Rejected;
    next.reviewed_at = Some(now);
    next.auto_accept_at = None;
    next.rejection_reason = Some(reason);
    next.rejection_notes = notes;

    let mut effects = Vec::new();
    if next.payment_status == PaymentStatus::Escrowed {
        next.payment_status = PaymentStatus::Refunded;
        effects.push(EffectIntent::Escrow(EscrowAction::Refund));
    }
    effects.push(EffectIntent::Notify(ReviewEvent::ReviewRejected {
        slot_id: next.id,
        request_id: next.request_id,
        reviewer_id,
        reason,
    }));

    Ok(Transition {
        effects,
        slot: next,
    })
}

fn request_elaboration(
    slot: &ReviewSlot,
    request: &ReviewRequest,
    owner_id: MemberId,
    message: String,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Submitted {
        return Err(ReviewError::slot_conflict(slot, "request elaboration on"));
    }
    check_owner(request, owner_id, "request elaboration on")?;
    if slot.elaboration_count >= MAX_ELABORATION_ROUNDS {
        return Err(ReviewError::slot_conflict(
            slot,
            "request another elaboration on",
        ));
    }
    let reviewer_id = current_reviewer(slot, "request elaboration on")?;

    // auto_accept_at carries over: the slot stays inside its grace period
    // while the reviewer answers.
    let mut next = slot.clone();
    next.status = SlotStatus::ElaborationRequested;
    next.elaboration_request = Some(message);
    next.elaboration_count += 1;
    next.elaboration_deadline = Some(now + Duration::days(ELABORATION_WINDOW_DAYS));

    Ok(Transition {
        effects: vec![EffectIntent::Notify(ReviewEvent::ElaborationRequested {
            slot_id: next.id,
            request_id: next.request_id,
            reviewer_id,
        })],
        slot: next,
    })
}

fn respond_elaboration(
    slot: &ReviewSlot,
    reviewer_id: MemberId,
    response: String,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::ElaborationRequested {
        return Err(ReviewError::slot_conflict(slot, "respond to elaboration on"));
    }
    check_reviewer(slot, reviewer_id, "respond to elaboration on")?;

    let mut next = back_to_submitted(slot, now);
    next.review_text = Some(match &slot.review_text {
        Some(existing) => format!("{existing}\n\n{response}"),
        None => response,
    });

    Ok(Transition {
        effects: vec![EffectIntent::Notify(ReviewEvent::ReviewSubmitted {
            slot_id: next.id,
            request_id: next.request_id,
            reviewer_id,
        })],
        slot: next,
    })
}

fn expire_elaboration(slot: &ReviewSlot, now: DateTime<Utc>) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::ElaborationRequested {
        return Err(ReviewError::slot_conflict(slot, "expire elaboration on"));
    }
    match slot.elaboration_deadline {
        Some(deadline) if now >= deadline => {}
        _ => {
            return Err(ReviewError::slot_conflict(
                slot,
                "expire unexpired elaboration on",
            ))
        }
    }

    // The original submission stands; the auto-accept clock restarts so the
    // owner gets a full window to act on what is already there.
    Ok(Transition {
        slot: back_to_submitted(slot, now),
        effects: vec![],
    })
}

fn open_dispute(
    slot: &ReviewSlot,
    reviewer_id: MemberId,
    reason: String,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Rejected {
        return Err(ReviewError::slot_conflict(slot, "dispute"));
    }
    // One dispute per slot: an admin-upheld rejection is final.
    if slot.dispute_resolution.is_some() {
        return Err(ReviewError::slot_conflict(
            slot,
            "dispute an already-resolved rejection on",
        ));
    }
    check_reviewer(slot, reviewer_id, "dispute")?;
    match slot.reviewed_at {
        Some(reviewed_at) if now < reviewed_at + Duration::days(DISPUTE_WINDOW_DAYS) => {}
        _ => {
            return Err(ReviewError::slot_conflict(
                slot,
                "dispute outside the window on",
            ))
        }
    }

    let mut next = slot.clone();
    next.status = SlotStatus::Disputed;
    next.is_disputed = true;
    next.dispute_reason = Some(reason);

    Ok(Transition {
        effects: vec![EffectIntent::Notify(ReviewEvent::DisputeCreated {
            slot_id: next.id,
            request_id: next.request_id,
            reviewer_id,
        })],
        slot: next,
    })
}

fn resolve_dispute(
    slot: &ReviewSlot,
    resolution: DisputeResolution,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<Transition, ReviewError> {
    if slot.status != SlotStatus::Disputed {
        return Err(ReviewError::slot_conflict(slot, "resolve dispute on"));
    }
    let reviewer_id = current_reviewer(slot, "resolve dispute on")?;

    let mut next = slot.clone();
    next.is_disputed = false;
    next.dispute_resolution = Some(resolution);
    next.resolution_notes = notes;

    let mut effects = Vec::new();
    match resolution {
        DisputeResolution::AdminAccepted => {
            next.status = SlotStatus::Accepted;
            next.reviewed_at = Some(now);
            effects.push(EffectIntent::Aggregate(AggregateDelta::CompletedInc));
            // Re-release a refund made on the original rejection (or release
            // funds still held, if the refund never went through).
            if matches!(
                next.payment_status,
                PaymentStatus::Refunded | PaymentStatus::Escrowed
            ) {
                next.payment_status = PaymentStatus::Released;
                effects.push(EffectIntent::Escrow(EscrowAction::Release));
            }
        }
        DisputeResolution::AdminRejected => {
            // Rejection upheld: no counter change, payment stays refunded.
            next.status = SlotStatus::Rejected;
        }
    }
    effects.push(EffectIntent::Notify(ReviewEvent::DisputeResolved {
        slot_id: next.id,
        request_id: next.request_id,
        reviewer_id,
        resolution,
    }));

    Ok(Transition {
        effects,
        slot: next,
    })
}

// ============================================================================
// Guard helpers
// ============================================================================

fn back_to_submitted(slot: &ReviewSlot, now: DateTime<Utc>) -> ReviewSlot {
    let mut next = slot.clone();
    next.status = SlotStatus::Submitted;
    next.elaboration_request = None;
    next.elaboration_deadline = None;
    next.auto_accept_at = Some(now + Duration::days(AUTO_ACCEPT_DAYS));
    next
}

fn check_reviewer(
    slot: &ReviewSlot,
    member_id: MemberId,
    operation: &'static str,
) -> Result<(), ReviewError> {
    match slot.reviewer_id {
        Some(reviewer) if reviewer == member_id => Ok(()),
        _ => Err(ReviewError::Permission(format!(
            "only the slot's reviewer may {operation} it"
        ))),
    }
}

fn check_owner(
    request: &ReviewRequest,
    member_id: MemberId,
    operation: &'static str,
) -> Result<(), ReviewError> {
    if request.owner_id == member_id {
        Ok(())
    } else {
        Err(ReviewError::Permission(format!(
            "only the request owner may {operation} it"
        )))
    }
}

/// A slot in any reviewer-holding status must carry a reviewer id; its
/// absence is a data anomaly surfaced as a conflict rather than a panic.
fn current_reviewer(slot: &ReviewSlot, operation: &'static str) -> Result<MemberId, ReviewError> {
    slot.reviewer_id
        .ok_or_else(|| ReviewError::slot_conflict(slot, operation))
}

// ============================================================================
// Tests
// ============================================================================
