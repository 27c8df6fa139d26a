//! Typed ID definitions for all domain entities.
//!
//! This module defines type aliases for each domain entity, providing
//! compile-time type safety for ID usage throughout the application.

// Re-export the core Id type and version markers
pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Member entities (creators, reviewers, admins).
pub struct Member;

/// Marker type for ReviewRequest entities (the parent aggregate).
pub struct ReviewRequest;

/// Marker type for ReviewSlot entities (one reviewer-capacity unit).
pub struct ReviewSlot;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for Member entities.
pub type MemberId = Id<Member>;

/// Typed ID for ReviewRequest entities.
pub type RequestId = Id<ReviewRequest>;

/// Typed ID for ReviewSlot entities.
pub type SlotId = Id<ReviewSlot>;
