//! DisputeResolver - admin-mediated override of a rejection outcome.
//!
//! Callers must already have verified the actor's admin capability at the
//! auth boundary; the resolver itself only enforces slot-state preconditions,
//! so a duplicate resolve is a `StateConflict`, never a double effect.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::common::{MemberId, SlotId};

use super::error::ReviewError;
use super::escrow::EscrowBridge;
use super::events::NotificationService;
use super::machines::SlotEvent;
use super::models::review_slot::{DisputeResolution, ReviewSlot};
use super::ops::{self, SlotTarget};

#[derive(Clone)]
pub struct DisputeResolver {
    pool: PgPool,
    escrow: Arc<dyn EscrowBridge>,
    notifier: Arc<dyn NotificationService>,
}

impl DisputeResolver {
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

    /// Resolve a dispute.
    ///
    /// `AdminAccepted`: the slot becomes ACCEPTED, `reviews_completed` is
    /// incremented, and a payment refunded on the original rejection is
    /// re-released. `AdminRejected`: the rejection stands; no counter or
    /// payment change.
    pub async fn resolve(
        &self,
        slot_id: SlotId,
        admin_id: MemberId,
        resolution: DisputeResolution,
        notes: Option<String>,
    ) -> Result<ReviewSlot, ReviewError> {
        let slot = ops::apply_event(
            &self.pool,
            self.escrow.as_ref(),
            self.notifier.as_ref(),
            SlotTarget::Slot(slot_id),
            SlotEvent::ResolveDispute { resolution, notes },
        )
        .await?;

        info!(
            slot_id = %slot.id,
            admin_id = %admin_id,
            resolution = ?resolution,
            "dispute resolved"
        );

        Ok(slot)
    }
}
