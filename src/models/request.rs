use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Actor, RequestStatus};

/// A doctor's counter-offer. Date and start time only ever travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedSlot {
    pub suggested_date: NaiveDate,
    pub suggested_start_time: NaiveTime,
}

/// The negotiable unit: a patient's preferred slot with a doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRequest {
    pub id: Uuid,
    pub patient_id: String,
    pub doctor_id: String,
    pub clinic_id: Option<String>,
    pub preferred_date: NaiveDate,
    pub preferred_start_time: NaiveTime,
    pub is_flexible: bool,
    pub status: RequestStatus,
    #[serde(flatten)]
    pub suggested: Option<SuggestedSlot>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub resulting_appointment_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl AppointmentRequest {
    /// Identity of the party on the other side of `actor`.
    pub fn counterparty_of(&self, actor: Actor) -> &str {
        match actor {
            Actor::Patient => &self.doctor_id,
            Actor::Doctor => &self.patient_id,
        }
    }
}

/// Inbound payload for creating a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointmentRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub clinic_id: Option<String>,
    pub preferred_date: NaiveDate,
    pub preferred_start_time: NaiveTime,
    pub is_flexible: bool,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Optional data accompanying a transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionPayload {
    #[serde(flatten)]
    pub suggested: Option<SuggestedSlot>,
    pub notes: Option<String>,
}

/// Query over stored requests. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFilter {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<RequestStatus>,
}

/// Next `updated_at` for a row last written at `previous`.
///
/// Strictly greater than `previous` even when the clock has not advanced,
/// so the compare-and-swap token changes on every write.
pub fn next_timestamp(previous: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    let floor = previous + Duration::microseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}
