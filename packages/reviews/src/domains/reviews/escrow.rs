//! Outbound interface to the payment subsystem.
//!
//! The engine calls `release`/`refund` exactly once per slot, strictly after
//! the triggering transition has committed - a payment action can never fire
//! for a status change that did not persist. Failures here are logged and do
//! not roll back slot state; reconciliation is the payment collaborator's
//! concern.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::models::review_slot::ReviewSlot;

#[async_trait]
pub trait EscrowBridge: Send + Sync {
    /// Release escrowed funds to the reviewer (slot entered ACCEPTED).
    async fn release(&self, slot: &ReviewSlot) -> Result<bool>;

    /// Refund escrowed funds to the requester (slot entered REJECTED).
    async fn refund(&self, slot: &ReviewSlot) -> Result<bool>;
}

/// Default implementation: logs the intent. The Stripe adapter lives in the
/// payments service and implements this trait over its client.
pub struct TracingEscrowBridge;

#[async_trait]
impl EscrowBridge for TracingEscrowBridge {
    async fn release(&self, slot: &ReviewSlot) -> Result<bool> {
        info!(
            slot_id = %slot.id,
            amount = %slot.payment_amount,
            "escrow release requested"
        );
        Ok(true)
    }

    async fn refund(&self, slot: &ReviewSlot) -> Result<bool> {
        info!(
            slot_id = %slot.id,
            amount = %slot.payment_amount,
            "escrow refund requested"
        );
        Ok(true)
    }
}
