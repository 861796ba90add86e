//! Counterparty notifications for negotiation state changes.
//!
//! The engine hands a typed `NotificationEvent` to a `NotificationEmitter`
//! after each committed transition. Delivery is fire-and-forget: a failed
//! emit is reported back as a warning and never undoes the state change.
//!
//! `NotificationHub` is the in-process emitter. Push subscribers (the
//! WebSocket route) hold a `broadcast::Receiver` and filter by recipient.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{NotificationKind, RequestStatus};

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// Outbound event for the counterparty of a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub event_type: NotificationKind,
    pub request_id: Uuid,
    pub recipient_id: String,
}

impl NotificationKind {
    /// Event announcing that a request entered `status`.
    ///
    /// `patient_accepted_alternative` never rests in storage; the engine
    /// moves straight on to `confirmed`, so both map to `Confirmed`.
    pub fn for_status(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => Self::RequestCreated,
            RequestStatus::Accepted => Self::Accepted,
            RequestStatus::Rejected | RequestStatus::PatientRejectedAlternative => Self::Rejected,
            RequestStatus::DoctorSuggestedAlternative => Self::AlternativeSuggested,
            RequestStatus::PatientAcceptedAlternative | RequestStatus::Confirmed => {
                Self::Confirmed
            }
            RequestStatus::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification delivery failed for {recipient_id}: {reason}")]
    DeliveryFailed { recipient_id: String, reason: String },
}

/// Receives state-transition events. Implementations must not block for long.
pub trait NotificationEmitter: Send + Sync {
    fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// In-process broadcast of notification events.
pub struct NotificationHub {
    sender: broadcast::Sender<NotificationEvent>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl NotificationEmitter for NotificationHub {
    fn emit(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                tracing::debug!(
                    event_type = %event.event_type,
                    request_id = %event.request_id,
                    receivers,
                    "Notification published"
                );
            }
            // No one listening is not a failure: the counterparty picks the
            // change up on its next read.
            Err(_) => {
                tracing::debug!(
                    event_type = %event.event_type,
                    request_id = %event.request_id,
                    "Notification published with no subscribers"
                );
            }
        }
        Ok(())
    }
}
