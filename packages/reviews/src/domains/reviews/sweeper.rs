//! DeadlineSweeper - periodic enforcement of time-bound transitions.
//!
//! The sweeper owns no in-memory state: deadlines live in durable columns
//! (`claim_deadline`, `auto_accept_at`, `elaboration_deadline`), each scan is
//! backed by a composite (status, deadline) index, and every due slot is
//! processed in its own transaction through the same apply path as
//! user-facing calls. A slot that fails is logged and left for the next
//! tick; because each transition re-checks its precondition under the row
//! lock, reprocessing is idempotent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::common::SlotId;

use super::error::ReviewError;
use super::escrow::EscrowBridge;
use super::events::NotificationService;
use super::machines::slot_machine::Acceptor;
use super::machines::SlotEvent;
use super::models::review_slot::ReviewSlot;
use super::ops::{self, SlotTarget};

/// Per-tick result aggregation, so failures are observable instead of
/// silently absorbed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Claimed slots abandoned past their claim deadline.
    pub abandoned: usize,
    /// Submitted slots accepted after their grace window elapsed.
    pub auto_accepted: usize,
    /// Unanswered elaboration requests reverted to SUBMITTED.
    pub elaborations_reverted: usize,
    /// Slots that transitioned between scan and lock (already handled).
    pub skipped: usize,
    /// Slots whose processing failed; retried on the next tick.
    pub errors: usize,
}

impl SweepReport {
    pub fn transitions(&self) -> usize {
        self.abandoned + self.auto_accepted + self.elaborations_reverted
    }
}

#[derive(Clone)]
pub struct DeadlineSweeper {
    pool: PgPool,
    escrow: Arc<dyn EscrowBridge>,
    notifier: Arc<dyn NotificationService>,
    batch_size: i64,
}

impl DeadlineSweeper {
    pub fn new(
        pool: PgPool,
        escrow: Arc<dyn EscrowBridge>,
        notifier: Arc<dyn NotificationService>,
    ) -> Self {
        Self {
            pool,
            escrow,
            notifier,
            batch_size: 100,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run one sweep over the three deadline indexes.
    ///
    /// Locks one slot at a time and commits before moving to the next, so a
    /// long sweep cannot starve user-facing claims.
    pub async fn tick(&self) -> Result<SweepReport, ReviewError> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let expired_claims =
            ReviewSlot::find_expired_claims(now, self.batch_size, &self.pool).await?;
        for slot_id in expired_claims {
            match self.apply(slot_id, SlotEvent::ExpireClaim).await {
                Ok(_) => report.abandoned += 1,
                Err(e) if e.is_state_conflict() => report.skipped += 1,
                Err(e) => {
                    error!(slot_id = %slot_id, error = %e, "failed to abandon expired claim");
                    report.errors += 1;
                }
            }
        }

        let due_accepts =
            ReviewSlot::find_due_auto_accepts(now, self.batch_size, &self.pool).await?;
        for slot_id in due_accepts {
            let event = SlotEvent::Accept {
                accepted_by: Acceptor::Auto,
            };
            match self.apply(slot_id, event).await {
                Ok(_) => report.auto_accepted += 1,
                Err(e) if e.is_state_conflict() => report.skipped += 1,
                Err(e) => {
                    error!(slot_id = %slot_id, error = %e, "failed to auto-accept review");
                    report.errors += 1;
                }
            }
        }

        let stale_elaborations =
            ReviewSlot::find_expired_elaborations(now, self.batch_size, &self.pool).await?;
        for slot_id in stale_elaborations {
            match self.apply(slot_id, SlotEvent::ExpireElaboration).await {
                Ok(_) => report.elaborations_reverted += 1,
                Err(e) if e.is_state_conflict() => report.skipped += 1,
                Err(e) => {
                    error!(slot_id = %slot_id, error = %e, "failed to expire elaboration");
                    report.errors += 1;
                }
            }
        }

        if report.transitions() > 0 || report.errors > 0 {
            info!(
                abandoned = report.abandoned,
                auto_accepted = report.auto_accepted,
                elaborations_reverted = report.elaborations_reverted,
                skipped = report.skipped,
                errors = report.errors,
                "deadline sweep finished"
            );
        }

        Ok(report)
    }

    async fn apply(&self, slot_id: SlotId, event: SlotEvent) -> Result<ReviewSlot, ReviewError> {
        ops::apply_event(
            &self.pool,
            self.escrow.as_ref(),
            self.notifier.as_ref(),
            SlotTarget::Slot(slot_id),
            event,
        )
        .await
    }
}

/// Start the sweeper on a fixed interval.
///
/// Returns the running scheduler; dropping it stops the sweeps.
pub async fn start_sweeper(
    sweeper: DeadlineSweeper,
    interval: Duration,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_job = Job::new_repeated_async(interval, move |_uuid, _lock| {
        let sweeper = sweeper.clone();
        Box::pin(async move {
            if let Err(e) = sweeper.tick().await {
                error!(error = %e, "deadline sweep failed");
            }
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    info!(interval_secs = interval.as_secs(), "deadline sweeper started");
    Ok(scheduler)
}
