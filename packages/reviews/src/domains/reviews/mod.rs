pub mod coordinator;
pub mod dispute;
pub mod error;
pub mod escrow;
pub mod events;
pub mod machines;
pub mod models;
pub mod sweeper;

mod ops;

// Re-export the operation surface
pub use coordinator::{ClaimCoordinator, ClaimTarget, NewReviewRequest, SubmitReview};
pub use dispute::DisputeResolver;
pub use error::ReviewError;
pub use escrow::{EscrowBridge, TracingEscrowBridge};
pub use events::{NotificationService, ReviewEvent, TracingNotifier};
pub use machines::{Acceptor, SlotEvent};
pub use sweeper::{start_sweeper, DeadlineSweeper, SweepReport};

// Re-export models (domain models)
pub use models::review_request::{RequestStatus, ReviewKind, ReviewRequest};
pub use models::review_slot::{
    DisputeResolution, PaymentStatus, RejectionReason, ReviewSlot, SlotStatus,
};
