//! Shared context and request bodies for the HTTP layer.
//!
//! Bodies carry dates, times and enum tokens as strings so malformed
//! values surface as `VALIDATION` errors in the standard error envelope
//! instead of extractor rejections.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::calendar::{CalendarItem, SUPPORTED_YEARS};
use crate::core_state::CoreState;
use crate::models::{
    Actor, NewAppointmentRequest, RequestFilter, RequestStatus, SuggestedSlot, TransitionPayload,
};

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub patient_id: String,
    pub doctor_id: String,
    #[serde(default)]
    pub clinic_id: Option<String>,
    pub preferred_date: String,
    pub preferred_start_time: String,
    #[serde(default)]
    pub is_flexible: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<CreateRequestBody> for NewAppointmentRequest {
    type Error = ApiError;

    fn try_from(body: CreateRequestBody) -> Result<Self, Self::Error> {
        Ok(Self {
            preferred_date: parse_date("preferred_date", &body.preferred_date)?,
            preferred_start_time: parse_time("preferred_start_time", &body.preferred_start_time)?,
            patient_id: body.patient_id,
            doctor_id: body.doctor_id,
            clinic_id: body.clinic_id,
            is_flexible: body.is_flexible,
            reason: body.reason,
            notes: body.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub actor: String,
    pub target_status: String,
    #[serde(default)]
    pub suggested_date: Option<String>,
    #[serde(default)]
    pub suggested_start_time: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A transition body after parsing.
#[derive(Debug)]
pub struct TransitionCommand {
    pub actor: Actor,
    pub target: RequestStatus,
    pub payload: TransitionPayload,
}

impl TryFrom<TransitionBody> for TransitionCommand {
    type Error = ApiError;

    fn try_from(body: TransitionBody) -> Result<Self, Self::Error> {
        let actor = parse_token::<Actor>("actor", &body.actor)?;
        let target = parse_token::<RequestStatus>("target_status", &body.target_status)?;
        let suggested = match (body.suggested_date, body.suggested_start_time) {
            (None, None) => None,
            (Some(date), Some(time)) => Some(SuggestedSlot {
                suggested_date: parse_date("suggested_date", &date)?,
                suggested_start_time: parse_time("suggested_start_time", &time)?,
            }),
            _ => {
                return Err(ApiError::Validation(
                    "suggested_date and suggested_start_time must be sent together".into(),
                ))
            }
        };
        Ok(Self {
            actor,
            target,
            payload: TransitionPayload {
                suggested,
                notes: body.notes,
            },
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<ListQuery> for RequestFilter {
    type Error = ApiError;

    fn try_from(query: ListQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            patient_id: query.patient_id.filter(|s| !s.is_empty()),
            doctor_id: query.doctor_id.filter(|s| !s.is_empty()),
            status: query
                .status
                .filter(|s| !s.is_empty())
                .map(|s| parse_token::<RequestStatus>("status", &s))
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AllowedQuery {
    pub actor: String,
}

// ═══════════════════════════════════════════════════════════
// Calendar
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthBody {
    pub anchor_date: String,
    #[serde(default)]
    pub items: Vec<CalendarItem>,
    #[serde(default = "default_true")]
    pub include_holidays: bool,
    /// IANA name; the service default applies when absent.
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub week_start: Option<String>,
}

fn default_true() -> bool {
    true
}

impl MonthBody {
    pub fn anchor(&self) -> Result<NaiveDate, ApiError> {
        parse_date("anchorDate", &self.anchor_date)
    }

    pub fn tz(&self) -> Result<Option<Tz>, ApiError> {
        self.time_zone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| ApiError::Validation(format!("Unknown time zone: {name}")))
            })
            .transpose()
    }

    pub fn weekday(&self) -> Result<Option<Weekday>, ApiError> {
        self.week_start
            .as_deref()
            .map(|day| {
                day.parse::<Weekday>()
                    .map_err(|_| ApiError::Validation(format!("Unknown weekday: {day}")))
            })
            .transpose()
    }
}

// ═══════════════════════════════════════════════════════════
// Parsing helpers
// ═══════════════════════════════════════════════════════════

/// `YYYY-MM-DD` with a year in `SUPPORTED_YEARS`.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::Validation(format!("{field} must be YYYY-MM-DD, got {value:?}")))?;
    if !SUPPORTED_YEARS.contains(&date.year()) {
        return Err(ApiError::Validation(format!(
            "{field} year must be between {} and {}, got {value:?}",
            SUPPORTED_YEARS.start(),
            SUPPORTED_YEARS.end()
        )));
    }
    Ok(date)
}

/// Accepts `HH:MM:SS` or `HH:MM`.
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ApiError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ApiError::Validation(format!("{field} must be HH:MM[:SS], got {value:?}")))
}

pub fn parse_token<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ApiError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ApiError::Validation(format!("Unknown {field}: {value:?}")))
}

pub fn parse_id(value: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(value.trim())
        .map_err(|_| ApiError::Validation(format!("Invalid id: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_accepts_minutes_or_seconds() {
        assert_eq!(
            parse_time("t", "09:30").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time("t", "09:30:15").unwrap(),
            NaiveTime::from_hms_opt(9, 30, 15).unwrap()
        );
        assert!(parse_time("t", "9.30").is_err());
    }

    #[test]
    fn date_outside_supported_years_is_rejected() {
        assert!(parse_date("d", "0001-01-01").is_ok());
        assert!(parse_date("d", "9999-12-31").is_ok());
        assert!(matches!(
            parse_date("anchorDate", "+262142-12-15"),
            Err(ApiError::Validation(_))
        ));
        assert!(parse_date("anchorDate", "-262143-01-10").is_err());
        assert!(parse_date("anchorDate", "0000-06-01").is_err());
    }

    #[test]
    fn date_rejects_other_layouts() {
        assert!(parse_date("d", "2024-02-29").is_ok());
        assert!(parse_date("d", "2023-02-29").is_err());
        assert!(parse_date("d", "29/02/2024").is_err());
    }

    #[test]
    fn transition_body_requires_both_slot_fields() {
        let body = TransitionBody {
            actor: "doctor".into(),
            target_status: "doctor_suggested_alternative".into(),
            suggested_date: Some("2024-05-02".into()),
            suggested_start_time: None,
            notes: None,
        };
        assert!(matches!(
            TransitionCommand::try_from(body),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn transition_body_parses_tokens() {
        let body = TransitionBody {
            actor: "doctor".into(),
            target_status: "doctor_suggested_alternative".into(),
            suggested_date: Some("2024-05-02".into()),
            suggested_start_time: Some("15:00".into()),
            notes: Some("Afternoon works better".into()),
        };
        let cmd = TransitionCommand::try_from(body).unwrap();
        assert_eq!(cmd.actor, Actor::Doctor);
        assert_eq!(cmd.target, RequestStatus::DoctorSuggestedAlternative);
        assert_eq!(
            cmd.payload.suggested.unwrap().suggested_start_time,
            NaiveTime::from_hms_opt(15, 0, 0).unwrap()
        );
    }

    #[test]
    fn unknown_status_in_query_is_validation() {
        let query = ListQuery {
            status: Some("approved".into()),
            ..Default::default()
        };
        assert!(matches!(
            RequestFilter::try_from(query),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn month_body_defaults() {
        let body: MonthBody = serde_json::from_value(serde_json::json!({
            "anchorDate": "2023-06-15"
        }))
        .unwrap();
        assert!(body.include_holidays);
        assert!(body.items.is_empty());
        assert_eq!(body.tz().unwrap(), None);
        assert_eq!(body.anchor().unwrap(), NaiveDate::from_ymd_opt(2023, 6, 15).unwrap());
    }

    #[test]
    fn month_body_rejects_unknown_zone() {
        let body: MonthBody = serde_json::from_value(serde_json::json!({
            "anchorDate": "2023-06-15",
            "timeZone": "Atlantis/Central"
        }))
        .unwrap();
        assert!(body.tz().is_err());
    }
}
