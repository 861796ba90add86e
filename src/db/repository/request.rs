use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use super::appointment::{get_appointment, upsert_appointment};
use crate::db::{open_database, open_memory_database, DatabaseError};
use crate::models::*;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The stored row matched the expected `updated_at` and was replaced.
    Swapped,
    /// Another writer got there first; nothing was written.
    Stale,
}

/// Durable store of appointment requests keyed by id.
///
/// Writes after creation go exclusively through `compare_and_swap`, which
/// checks the `updated_at` token read earlier. The optional `booking` is
/// written in the same transaction so a status change and its appointment
/// commit or fail together.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, request: &AppointmentRequest) -> Result<(), DatabaseError>;

    fn get(&self, id: &Uuid) -> Result<Option<AppointmentRequest>, DatabaseError>;

    fn list(&self, filter: &RequestFilter) -> Result<Vec<AppointmentRequest>, DatabaseError>;

    fn compare_and_swap(
        &self,
        id: &Uuid,
        expected_updated_at: NaiveDateTime,
        new_value: &AppointmentRequest,
        booking: Option<&Appointment>,
    ) -> Result<SwapOutcome, DatabaseError>;

    fn get_appointment(&self, id: &Uuid) -> Result<Option<Appointment>, DatabaseError>;
}

/// SQLite-backed repository sharing one connection behind a mutex.
pub struct SqliteRequestRepository {
    conn: Mutex<Connection>,
}

impl SqliteRequestRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (or create) the database file and run migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(open_database(path)?))
    }

    /// Fresh in-memory store (tests, demos).
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(open_memory_database()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

impl RequestRepository for SqliteRequestRepository {
    fn insert(&self, request: &AppointmentRequest) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        insert_request(&conn, request)
    }

    fn get(&self, id: &Uuid) -> Result<Option<AppointmentRequest>, DatabaseError> {
        let conn = self.lock()?;
        get_request(&conn, id)
    }

    fn list(&self, filter: &RequestFilter) -> Result<Vec<AppointmentRequest>, DatabaseError> {
        let conn = self.lock()?;
        list_requests(&conn, filter)
    }

    fn compare_and_swap(
        &self,
        id: &Uuid,
        expected_updated_at: NaiveDateTime,
        new_value: &AppointmentRequest,
        booking: Option<&Appointment>,
    ) -> Result<SwapOutcome, DatabaseError> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so another process
        // cannot interleave between the check and the booking write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if swap_request(&tx, id, expected_updated_at, new_value)? == SwapOutcome::Stale {
            // Dropping the transaction rolls it back.
            return Ok(SwapOutcome::Stale);
        }
        if let Some(appointment) = booking {
            upsert_appointment(&tx, appointment)?;
        }

        tx.commit()?;
        Ok(SwapOutcome::Swapped)
    }

    fn get_appointment(&self, id: &Uuid) -> Result<Option<Appointment>, DatabaseError> {
        let conn = self.lock()?;
        get_appointment(&conn, id)
    }
}

// ─── Row-level functions ──────────────────────────────────────────────────────

pub fn insert_request(conn: &Connection, request: &AppointmentRequest) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO appointment_requests
         (id, patient_id, doctor_id, clinic_id, preferred_date, preferred_start_time,
          is_flexible, status, suggested_date, suggested_start_time, reason, notes,
          resulting_appointment_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            request.id.to_string(),
            request.patient_id,
            request.doctor_id,
            request.clinic_id,
            request.preferred_date.format(DATE_FORMAT).to_string(),
            request.preferred_start_time.format(TIME_FORMAT).to_string(),
            request.is_flexible,
            request.status.as_str(),
            request.suggested.map(|s| s.suggested_date.format(DATE_FORMAT).to_string()),
            request
                .suggested
                .map(|s| s.suggested_start_time.format(TIME_FORMAT).to_string()),
            request.reason,
            request.notes,
            request.resulting_appointment_id.map(|id| id.to_string()),
            request.created_at.format(TIMESTAMP_FORMAT).to_string(),
            request.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_request(conn: &Connection, id: &Uuid) -> Result<Option<AppointmentRequest>, DatabaseError> {
    let request = conn
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM appointment_requests WHERE id = ?1"),
            params![id.to_string()],
            request_from_row,
        )
        .optional()?;
    Ok(request)
}

pub fn list_requests(
    conn: &Connection,
    filter: &RequestFilter,
) -> Result<Vec<AppointmentRequest>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM appointment_requests
         WHERE (?1 IS NULL OR patient_id = ?1)
           AND (?2 IS NULL OR doctor_id = ?2)
           AND (?3 IS NULL OR status = ?3)
         ORDER BY preferred_date ASC, preferred_start_time ASC, created_at ASC"
    ))?;

    let rows = stmt.query_map(
        params![
            filter.patient_id,
            filter.doctor_id,
            filter.status.map(|s| s.as_str()),
        ],
        request_from_row,
    )?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Conditional update keyed on the `updated_at` read by the caller.
fn swap_request(
    conn: &Connection,
    id: &Uuid,
    expected_updated_at: NaiveDateTime,
    new_value: &AppointmentRequest,
) -> Result<SwapOutcome, DatabaseError> {
    let changed = conn.execute(
        "UPDATE appointment_requests
         SET status = ?1, suggested_date = ?2, suggested_start_time = ?3, notes = ?4,
             resulting_appointment_id = ?5, updated_at = ?6
         WHERE id = ?7 AND updated_at = ?8",
        params![
            new_value.status.as_str(),
            new_value
                .suggested
                .map(|s| s.suggested_date.format(DATE_FORMAT).to_string()),
            new_value
                .suggested
                .map(|s| s.suggested_start_time.format(TIME_FORMAT).to_string()),
            new_value.notes,
            new_value.resulting_appointment_id.map(|id| id.to_string()),
            new_value.updated_at.format(TIMESTAMP_FORMAT).to_string(),
            id.to_string(),
            expected_updated_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;

    Ok(if changed == 1 {
        SwapOutcome::Swapped
    } else {
        SwapOutcome::Stale
    })
}

const REQUEST_COLUMNS: &str = "id, patient_id, doctor_id, clinic_id, preferred_date,
    preferred_start_time, is_flexible, status, suggested_date, suggested_start_time,
    reason, notes, resulting_appointment_id, created_at, updated_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRequest> {
    let suggested_date: Option<String> = row.get(8)?;
    let suggested_time: Option<String> = row.get(9)?;
    let suggested = match (suggested_date, suggested_time) {
        (Some(date), Some(time)) => Some(SuggestedSlot {
            suggested_date: parse_date(8, &date)?,
            suggested_start_time: parse_time(9, &time)?,
        }),
        _ => None,
    };

    Ok(AppointmentRequest {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        clinic_id: row.get(3)?,
        preferred_date: parse_date(4, &row.get::<_, String>(4)?)?,
        preferred_start_time: parse_time(5, &row.get::<_, String>(5)?)?,
        is_flexible: row.get(6)?,
        status: parse_enum(7, &row.get::<_, String>(7)?)?,
        suggested,
        reason: row.get(10)?,
        notes: row.get(11)?,
        resulting_appointment_id: row
            .get::<_, Option<String>>(12)?
            .map(|s| parse_uuid(12, &s))
            .transpose()?,
        created_at: parse_timestamp(13, &row.get::<_, String>(13)?)?,
        updated_at: parse_timestamp(14, &row.get::<_, String>(14)?)?,
    })
}

// ─── Column parsing ───────────────────────────────────────────────────────────

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_time(idx: usize, s: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn parse_enum<T>(idx: usize, s: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = DatabaseError>,
{
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}
