//! ReviewSlot model and persistence.
//!
//! A slot is one reviewer-capacity unit within a review request. All field
//! mutation flows through the state-machine operations; this module only
//! provides locked reads, the full-row update, batch creation, and the
//! deadline-index scans the sweeper runs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgExecutor;

use crate::common::{MemberId, RequestId, SlotId};

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle status of a review slot.
///
/// Initial state is `Available`; `Accepted` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "slot_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    #[default]
    Available,
    Claimed,
    Submitted,
    Accepted,
    Rejected,
    Abandoned,
    Disputed,
    ElaborationRequested,
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotStatus::Available => write!(f, "available"),
            SlotStatus::Claimed => write!(f, "claimed"),
            SlotStatus::Submitted => write!(f, "submitted"),
            SlotStatus::Accepted => write!(f, "accepted"),
            SlotStatus::Rejected => write!(f, "rejected"),
            SlotStatus::Abandoned => write!(f, "abandoned"),
            SlotStatus::Disputed => write!(f, "disputed"),
            SlotStatus::ElaborationRequested => write!(f, "elaboration_requested"),
        }
    }
}

/// Escrow state for the slot's payment.
///
/// `Pending -> Escrowed` happens on capture (external payment collaborator).
/// The state machine moves `Escrowed -> Released` on accept and
/// `Escrowed -> Refunded` on reject; a dispute resolved in the reviewer's
/// favor may move `Refunded -> Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Escrowed,
    Released,
    Refunded,
}

/// Why the owner rejected a submitted review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rejection_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    LowEffort,
    OffTopic,
    GuidelinesViolation,
    Other,
}

/// Outcome of an admin-mediated dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dispute_resolution", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    AdminAccepted,
    AdminRejected,
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewSlot {
    pub id: SlotId,
    pub request_id: RequestId,

    /// Set exactly while a reviewer holds the slot (claimed through disputed).
    pub reviewer_id: Option<MemberId>,
    pub status: SlotStatus,

    // Durable deadlines - evaluated by the sweeper, never in-memory timers
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub auto_accept_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,

    // Dispute
    pub is_disputed: bool,
    pub dispute_reason: Option<String>,
    pub dispute_resolution: Option<DisputeResolution>,
    pub resolution_notes: Option<String>,

    // Elaboration (at most two rounds)
    pub elaboration_request: Option<String>,
    pub elaboration_count: i32,
    pub elaboration_deadline: Option<DateTime<Utc>>,

    // Payment
    pub payment_amount: Decimal,
    pub payment_status: PaymentStatus,

    // Review content
    pub review_text: Option<String>,
    pub rating: Option<i32>,
    pub attachments: Option<Json<Vec<String>>>,

    // Rejection
    pub rejection_reason: Option<RejectionReason>,
    pub rejection_notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SLOT_COLUMNS: &str = "id, request_id, reviewer_id, status, \
     claimed_at, claim_deadline, submitted_at, auto_accept_at, reviewed_at, \
     is_disputed, dispute_reason, dispute_resolution, resolution_notes, \
     elaboration_request, elaboration_count, elaboration_deadline, \
     payment_amount, payment_status, review_text, rating, attachments, \
     rejection_reason, rejection_notes, created_at, updated_at";

impl ReviewSlot {
    pub async fn find_by_id(
        id: SlotId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {SLOT_COLUMNS} FROM review_slots WHERE id = $1");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock a specific slot row for the current transaction.
    pub async fn lock_by_id(
        id: SlotId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {SLOT_COLUMNS} FROM review_slots WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Pick and lock one AVAILABLE slot on the request.
    ///
    /// `FOR UPDATE SKIP LOCKED` makes concurrent claimers skip rows already
    /// locked by a racing transaction instead of queueing on them, so the
    /// losers of the race on the last slot observe "no slots available"
    /// rather than an over-claim.
    pub async fn lock_available_for_request(
        request_id: RequestId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM review_slots \
             WHERE request_id = $1 AND status = 'available' \
             ORDER BY id \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        );
        sqlx::query_as::<_, Self>(&sql)
            .bind(request_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_request(
        request_id: RequestId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql =
            format!("SELECT {SLOT_COLUMNS} FROM review_slots WHERE request_id = $1 ORDER BY id");
        sqlx::query_as::<_, Self>(&sql)
            .bind(request_id)
            .fetch_all(executor)
            .await
    }

    /// Batch-insert the AVAILABLE slots for a freshly published request, one
    /// per payment amount.
    pub async fn insert_batch(
        request_id: RequestId,
        amounts: &[Decimal],
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<SlotId>, sqlx::Error> {
        let ids: Vec<SlotId> = amounts.iter().map(|_| SlotId::new()).collect();

        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO review_slots (id, request_id, payment_amount) ",
        );
        builder.push_values(ids.iter().zip(amounts), |mut row, (id, amount)| {
            row.push_bind(*id).push_bind(request_id).push_bind(*amount);
        });
        builder.build().execute(executor).await?;

        Ok(ids)
    }

    /// Persist the slot after a state-machine transition (full mutable row).
    pub async fn update(&self, executor: impl PgExecutor<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE review_slots
            SET reviewer_id = $2,
                status = $3,
                claimed_at = $4,
                claim_deadline = $5,
                submitted_at = $6,
                auto_accept_at = $7,
                reviewed_at = $8,
                is_disputed = $9,
                dispute_reason = $10,
                dispute_resolution = $11,
                resolution_notes = $12,
                elaboration_request = $13,
                elaboration_count = $14,
                elaboration_deadline = $15,
                payment_status = $16,
                review_text = $17,
                rating = $18,
                attachments = $19,
                rejection_reason = $20,
                rejection_notes = $21,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.reviewer_id)
        .bind(self.status)
        .bind(self.claimed_at)
        .bind(self.claim_deadline)
        .bind(self.submitted_at)
        .bind(self.auto_accept_at)
        .bind(self.reviewed_at)
        .bind(self.is_disputed)
        .bind(&self.dispute_reason)
        .bind(self.dispute_resolution)
        .bind(&self.resolution_notes)
        .bind(&self.elaboration_request)
        .bind(self.elaboration_count)
        .bind(self.elaboration_deadline)
        .bind(self.payment_status)
        .bind(&self.review_text)
        .bind(self.rating)
        .bind(&self.attachments)
        .bind(self.rejection_reason)
        .bind(&self.rejection_notes)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// External payment collaborator hook: record that funds were captured
    /// into escrow. Guarded so a duplicate capture callback is a no-op.
    pub async fn mark_escrowed(
        id: SlotId,
        executor: impl PgExecutor<'_>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE review_slots
            SET payment_status = 'escrowed',
                updated_at = NOW()
            WHERE id = $1 AND payment_status = 'pending'
            "#,
        )
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Sweeper scans - each backed by a composite (status, deadline) index
    // ========================================================================

    /// Claimed slots whose claim deadline has passed (candidates for abandon).
    pub async fn find_expired_claims(
        now: DateTime<Utc>,
        limit: i64,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<SlotId>, sqlx::Error> {
        let rows: Vec<(SlotId,)> = sqlx::query_as(
            r#"
            SELECT id FROM review_slots
            WHERE status = 'claimed' AND claim_deadline <= $1
            ORDER BY claim_deadline
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Submitted slots whose auto-accept window has elapsed.
    pub async fn find_due_auto_accepts(
        now: DateTime<Utc>,
        limit: i64,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<SlotId>, sqlx::Error> {
        let rows: Vec<(SlotId,)> = sqlx::query_as(
            r#"
            SELECT id FROM review_slots
            WHERE status = 'submitted' AND auto_accept_at <= $1
            ORDER BY auto_accept_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Elaboration requests the reviewer never answered in time.
    pub async fn find_expired_elaborations(
        now: DateTime<Utc>,
        limit: i64,
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<SlotId>, sqlx::Error> {
        let rows: Vec<(SlotId,)> = sqlx::query_as(
            r#"
            SELECT id FROM review_slots
            WHERE status = 'elaboration_requested' AND elaboration_deadline <= $1
            ORDER BY elaboration_deadline
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
