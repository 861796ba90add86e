//! Appointment request negotiation.
//!
//! A patient proposes a slot (`pending`). The doctor accepts, rejects, or,
//! for flexible requests, counter-offers. The patient answers a counter-offer;
//! accepting it confirms the appointment in the same write. Either party may
//! cancel while the request is still live.
//!
//! - `transitions`: the table and permission rules (pure)
//! - `engine`: read → plan → compare-and-swap → notify

pub mod engine;
pub mod transitions;

pub use engine::{EngineSettings, NegotiationEngine, NegotiationOutcome};
pub use transitions::{allowed_targets, Plan};

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::RequestStatus;

#[derive(Error, Debug)]
pub enum NegotiationError {
    /// Malformed input. Not retryable as-is.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Target not reachable from the current status, or the actor lacks
    /// permission. Re-read the request before trying again.
    #[error("Invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
        reason: String,
    },

    /// Another writer changed the request between read and write.
    #[error("Request {request_id} was modified concurrently; re-read and retry")]
    Conflict { request_id: Uuid },

    #[error("Appointment request not found: {0}")]
    NotFound(Uuid),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(Uuid),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<transitions::Denial> for NegotiationError {
    fn from(denial: transitions::Denial) -> Self {
        Self::InvalidTransition {
            from: denial.from,
            to: denial.to,
            reason: denial.reason,
        }
    }
}
