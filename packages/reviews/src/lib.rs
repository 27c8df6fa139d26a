// Crittique Review Engine
//
// This crate implements the review-slot lifecycle for the platform: creators
// publish review requests with a bounded number of reviewer slots, reviewers
// claim slots and submit reviews, and owners accept/reject with optional
// elaboration rounds and admin-mediated disputes. Claim concurrency is
// serialized through Postgres row locks; every time-bound transition is
// driven by durable deadline columns swept by a background task.

pub mod common;
pub mod config;
pub mod domains;

pub use config::*;
