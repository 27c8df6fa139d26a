//! Logical notification events emitted by committed slot transitions.
//!
//! The core only emits these; delivery, channel, and template logic belong to
//! the external notification collaborator. Events are published strictly
//! after the owning transaction commits, so a consumer never hears about a
//! transition that did not persist.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::common::{MemberId, RequestId, SlotId};

use super::models::review_slot::{DisputeResolution, RejectionReason};

/// Notification payloads carrying slot and actor ids.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReviewEvent {
    SlotClaimed {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
    },
    SlotAbandoned {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
    },
    ReviewSubmitted {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
    },
    ReviewAccepted {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
        /// True when the accept came from the auto-accept window, not the owner.
        auto: bool,
    },
    ReviewRejected {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
        reason: RejectionReason,
    },
    ElaborationRequested {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
    },
    DisputeCreated {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
    },
    DisputeResolved {
        slot_id: SlotId,
        request_id: RequestId,
        reviewer_id: MemberId,
        resolution: DisputeResolution,
    },
}

impl ReviewEvent {
    /// Event name as used by downstream routing.
    pub fn name(&self) -> &'static str {
        match self {
            ReviewEvent::SlotClaimed { .. } => "slot_claimed",
            ReviewEvent::SlotAbandoned { .. } => "slot_abandoned",
            ReviewEvent::ReviewSubmitted { .. } => "review_submitted",
            ReviewEvent::ReviewAccepted { .. } => "review_accepted",
            ReviewEvent::ReviewRejected { .. } => "review_rejected",
            ReviewEvent::ElaborationRequested { .. } => "elaboration_requested",
            ReviewEvent::DisputeCreated { .. } => "dispute_created",
            ReviewEvent::DisputeResolved { .. } => "dispute_resolved",
        }
    }
}

/// Outbound seam to the notification collaborator.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Publish a committed event. Fire-and-forget from the core's point of
    /// view; delivery failures are the collaborator's concern.
    async fn publish(&self, event: &ReviewEvent);
}

/// Default implementation: structured log lines only.
pub struct TracingNotifier;

#[async_trait]
impl NotificationService for TracingNotifier {
    async fn publish(&self, event: &ReviewEvent) {
        info!(event = event.name(), payload = ?event, "review event");
    }
}
