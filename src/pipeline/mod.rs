//! Account takeover and acceptance pipeline.
//!
//! Stages run in order: eligibility, authentication, credential takeover,
//! session audit, pending review, final decision. Every stage re-reads the
//! account and acts only from its expected predecessor status.

pub mod audit;
pub mod auth;
pub mod decision;
pub mod eligibility;
pub mod queue;
pub mod service;
pub mod takeover;

use std::sync::Arc;

pub use service::{IntakeService, SweepSummary};

/// Wall-clock source in unix milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(crate::account::types::current_timestamp)
}
