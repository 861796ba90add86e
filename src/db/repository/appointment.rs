use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::request::{
    parse_date, parse_enum, parse_time, parse_timestamp, parse_uuid, DATE_FORMAT, TIME_FORMAT,
    TIMESTAMP_FORMAT,
};
use crate::db::DatabaseError;
use crate::models::*;

/// Inserts the appointment, or updates its status if it already exists.
///
/// The id is derived from the request id, so booking the same request
/// twice lands on the same row.
pub fn upsert_appointment(conn: &Connection, appointment: &Appointment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointments
         (id, request_id, patient_id, doctor_id, clinic_id, date, start_time, end_time,
          status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET status = excluded.status",
        params![
            appointment.id.to_string(),
            appointment.request_id.to_string(),
            appointment.patient_id,
            appointment.doctor_id,
            appointment.clinic_id,
            appointment.date.format(DATE_FORMAT).to_string(),
            appointment.start_time.format(TIME_FORMAT).to_string(),
            appointment.end_time.format(TIME_FORMAT).to_string(),
            appointment.status.as_str(),
            appointment.created_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
    let appointment = conn
        .query_row(
            "SELECT id, request_id, patient_id, doctor_id, clinic_id, date, start_time,
                    end_time, status, created_at
             FROM appointments WHERE id = ?1",
            params![id.to_string()],
            appointment_from_row,
        )
        .optional()?;
    Ok(appointment)
}

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        request_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        patient_id: row.get(2)?,
        doctor_id: row.get(3)?,
        clinic_id: row.get(4)?,
        date: parse_date(5, &row.get::<_, String>(5)?)?,
        start_time: parse_time(6, &row.get::<_, String>(6)?)?,
        end_time: parse_time(7, &row.get::<_, String>(7)?)?,
        status: parse_enum(8, &row.get::<_, String>(8)?)?,
        created_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
    })
}
