use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AppointmentStatus;
use super::request::AppointmentRequest;

/// Namespace for deriving appointment ids from request ids.
const APPOINTMENT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x1c, 0x2d, 0x8e, 0x43, 0x5a, 0x4b, 0x0e, 0x9a, 0x71, 0x3e, 0x0d, 0x52, 0xc4, 0x87, 0x19,
]);

/// The appointment an accepted or confirmed request produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub request_id: Uuid,
    pub patient_id: String,
    pub doctor_id: String,
    pub clinic_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

impl Appointment {
    /// Stable id for the appointment booked from `request_id`.
    pub fn id_for_request(request_id: &Uuid) -> Uuid {
        Uuid::new_v5(&APPOINTMENT_NAMESPACE, request_id.as_bytes())
    }

    /// Books `request` at `date`/`start_time` for `duration`.
    pub fn book(
        request: &AppointmentRequest,
        date: NaiveDate,
        start_time: NaiveTime,
        duration: Duration,
        now: NaiveDateTime,
    ) -> Self {
        // End time wraps past midnight like a wall clock; the date stays the start date.
        let end_time = start_time + duration;
        Self {
            id: Self::id_for_request(&request.id),
            request_id: request.id,
            patient_id: request.patient_id.clone(),
            doctor_id: request.doctor_id.clone(),
            clinic_id: request.clinic_id.clone(),
            date,
            start_time,
            end_time,
            status: AppointmentStatus::Scheduled,
            created_at: now,
        }
    }
}
