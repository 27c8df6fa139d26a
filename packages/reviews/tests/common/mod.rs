#![allow(dead_code)]

pub mod harness;

pub use harness::TestHarness;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use reviews_core::common::{MemberId, RequestId, SlotId};
use reviews_core::domains::reviews::{
    ClaimCoordinator, DeadlineSweeper, DisputeResolver, EscrowBridge, NewReviewRequest,
    NotificationService, ReviewEvent, ReviewKind, ReviewRequest, ReviewSlot, SubmitReview,
};

// ============================================================================
// Recording collaborators
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowCall {
    Release,
    Refund,
}

/// EscrowBridge that records every call, for exactly-once assertions.
#[derive(Default)]
pub struct RecordingEscrowBridge {
    calls: Mutex<Vec<(SlotId, EscrowCall)>>,
}

impl RecordingEscrowBridge {
    pub fn calls_for(&self, slot_id: SlotId) -> Vec<EscrowCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == slot_id)
            .map(|(_, call)| *call)
            .collect()
    }
}

#[async_trait]
impl EscrowBridge for RecordingEscrowBridge {
    async fn release(&self, slot: &ReviewSlot) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((slot.id, EscrowCall::Release));
        Ok(true)
    }

    async fn refund(&self, slot: &ReviewSlot) -> Result<bool> {
        self.calls
            .lock()
            .unwrap()
            .push((slot.id, EscrowCall::Refund));
        Ok(true)
    }
}

/// NotificationService that records published events per slot.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ReviewEvent>>,
}

impl RecordingNotifier {
    pub fn names_for(&self, slot_id: SlotId) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| event_slot_id(e) == slot_id)
            .map(|e| e.name())
            .collect()
    }
}

#[async_trait]
impl NotificationService for RecordingNotifier {
    async fn publish(&self, event: &ReviewEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn event_slot_id(event: &ReviewEvent) -> SlotId {
    match event {
        ReviewEvent::SlotClaimed { slot_id, .. }
        | ReviewEvent::SlotAbandoned { slot_id, .. }
        | ReviewEvent::ReviewSubmitted { slot_id, .. }
        | ReviewEvent::ReviewAccepted { slot_id, .. }
        | ReviewEvent::ReviewRejected { slot_id, .. }
        | ReviewEvent::ElaborationRequested { slot_id, .. }
        | ReviewEvent::DisputeCreated { slot_id, .. }
        | ReviewEvent::DisputeResolved { slot_id, .. } => *slot_id,
    }
}

// ============================================================================
// Engine bundle
// ============================================================================

/// Everything a test needs, wired over one pool with recording collaborators.
pub struct TestEngine {
    pub coordinator: ClaimCoordinator,
    pub resolver: DisputeResolver,
    pub sweeper: DeadlineSweeper,
    pub escrow: Arc<RecordingEscrowBridge>,
    pub events: Arc<RecordingNotifier>,
}

impl TestEngine {
    pub fn new(pool: PgPool) -> Self {
        let escrow = Arc::new(RecordingEscrowBridge::default());
        let events = Arc::new(RecordingNotifier::default());
        Self {
            coordinator: ClaimCoordinator::new(pool.clone(), escrow.clone(), events.clone()),
            resolver: DisputeResolver::new(pool.clone(), escrow.clone(), events.clone()),
            sweeper: DeadlineSweeper::new(pool, escrow.clone(), events.clone()),
            escrow,
            events,
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn free_request(owner_id: MemberId, reviews_requested: i32) -> NewReviewRequest {
    NewReviewRequest {
        owner_id,
        content_type: "track".to_string(),
        review_kind: ReviewKind::Free,
        reviews_requested,
        budget: Decimal::ZERO,
        deadline: None,
    }
}

pub fn expert_request(
    owner_id: MemberId,
    reviews_requested: i32,
    budget: Decimal,
) -> NewReviewRequest {
    NewReviewRequest {
        owner_id,
        content_type: "track".to_string(),
        review_kind: ReviewKind::Expert,
        reviews_requested,
        budget,
        deadline: None,
    }
}

pub fn valid_review() -> SubmitReview {
    SubmitReview {
        text: "The mix is solid overall but the low end gets muddy around the \
               second chorus; consider a high-pass on the pads."
            .to_string(),
        rating: 4,
        attachments: vec![],
    }
}

pub async fn publish(
    engine: &TestEngine,
    input: NewReviewRequest,
) -> (ReviewRequest, Vec<ReviewSlot>) {
    let request = engine
        .coordinator
        .publish(input)
        .await
        .expect("publish failed");
    let slots = ReviewSlot::find_by_request(request.id, engine.coordinator.pool())
        .await
        .expect("failed to load slots");
    (request, slots)
}

// ============================================================================
// Reloads
// ============================================================================

pub async fn reload_slot(pool: &PgPool, id: SlotId) -> ReviewSlot {
    ReviewSlot::find_by_id(id, pool)
        .await
        .expect("slot query failed")
        .expect("slot not found")
}

pub async fn reload_request(pool: &PgPool, id: RequestId) -> ReviewRequest {
    ReviewRequest::find_by_id(id, pool)
        .await
        .expect("request query failed")
        .expect("request not found")
}

// ============================================================================
// Clock manipulation
// ============================================================================
//
// Deadlines are durable columns, so tests move time by rewriting them
// instead of sleeping.

pub async fn backdate_claim_deadline(pool: &PgPool, slot_id: SlotId) {
    sqlx::query("UPDATE review_slots SET claim_deadline = $2 WHERE id = $1")
        .bind(slot_id)
        .bind(Utc::now() - Duration::hours(1))
        .execute(pool)
        .await
        .expect("failed to backdate claim_deadline");
}

pub async fn backdate_auto_accept(pool: &PgPool, slot_id: SlotId) {
    sqlx::query("UPDATE review_slots SET auto_accept_at = $2 WHERE id = $1")
        .bind(slot_id)
        .bind(Utc::now() - Duration::hours(1))
        .execute(pool)
        .await
        .expect("failed to backdate auto_accept_at");
}

pub async fn backdate_elaboration_deadline(pool: &PgPool, slot_id: SlotId) {
    sqlx::query("UPDATE review_slots SET elaboration_deadline = $2 WHERE id = $1")
        .bind(slot_id)
        .bind(Utc::now() - Duration::hours(1))
        .execute(pool)
        .await
        .expect("failed to backdate elaboration_deadline");
}

/// Push `reviewed_at` into the past, e.g. beyond the dispute window.
pub async fn backdate_reviewed_at(pool: &PgPool, slot_id: SlotId, days: i64) {
    sqlx::query("UPDATE review_slots SET reviewed_at = $2 WHERE id = $1")
        .bind(slot_id)
        .bind(Utc::now() - Duration::days(days))
        .execute(pool)
        .await
        .expect("failed to backdate reviewed_at");
}
