use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

use crate::common::{MemberId, RequestId};

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle status of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Draft,
    Pending,
    InReview,
    Completed,
    Cancelled,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Draft => write!(f, "draft"),
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::InReview => write!(f, "in_review"),
            RequestStatus::Completed => write!(f, "completed"),
            RequestStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Whether the request pays its reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "review_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    #[default]
    Free,
    Expert,
}

// ============================================================================
// Model
// ============================================================================

/// ReviewRequest - the parent aggregate owning a batch of review slots.
///
/// Counter invariant, enforced in code and by a DB CHECK constraint:
/// `0 <= reviews_completed <= reviews_claimed <= reviews_requested`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewRequest {
    pub id: RequestId,
    pub owner_id: MemberId,

    /// What is being reviewed ('article', 'design', 'video', ...)
    pub content_type: String,
    pub review_kind: ReviewKind,
    pub status: RequestStatus,

    // Slot counters
    pub reviews_requested: i32,
    pub reviews_claimed: i32,
    pub reviews_completed: i32,

    pub budget: Decimal,
    pub deadline: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const REQUEST_COLUMNS: &str = "id, owner_id, content_type, review_kind, status, \
     reviews_requested, reviews_claimed, reviews_completed, budget, deadline, \
     created_at, updated_at";

impl ReviewRequest {
    pub async fn find_by_id(
        id: RequestId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM review_requests WHERE id = $1");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock the request row for the duration of the current transaction.
    ///
    /// Every slot operation takes this lock before touching the slot row, so
    /// counter updates and claim selection are serialized per request.
    pub async fn lock_by_id(
        id: RequestId,
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM review_requests WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn insert(&self, executor: impl PgExecutor<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO review_requests
                (id, owner_id, content_type, review_kind, status,
                 reviews_requested, reviews_claimed, reviews_completed, budget, deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(self.id)
        .bind(self.owner_id)
        .bind(&self.content_type)
        .bind(self.review_kind)
        .bind(self.status)
        .bind(self.reviews_requested)
        .bind(self.reviews_claimed)
        .bind(self.reviews_completed)
        .bind(self.budget)
        .bind(self.deadline)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Persist counters and status after a slot transition's aggregate delta.
    pub async fn update_counters(&self, executor: impl PgExecutor<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE review_requests
            SET reviews_claimed = $2,
                reviews_completed = $3,
                status = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.reviews_claimed)
        .bind(self.reviews_completed)
        .bind(self.status)
        .execute(executor)
        .await?;

        Ok(())
    }
}
