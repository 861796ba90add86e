use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CategoryTag;

/// When an event happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventTime {
    AllDay { date: NaiveDate },
    Timed { start: DateTime<Utc>, end: DateTime<Utc> },
}

/// A primary-calendar entry: a confirmed appointment or any other event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    pub id: String,
    pub title: String,
    pub when: EventTime,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub category: Option<CategoryTag>,
    #[serde(default)]
    pub color_id: Option<u32>,
}

/// Date-only marker from a holiday feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayItem {
    pub id: String,
    pub date: NaiveDate,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarItem {
    Appointment(EventItem),
    Holiday(HolidayItem),
}

impl CalendarItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Appointment(event) => &event.id,
            Self::Holiday(holiday) => &holiday.id,
        }
    }

    pub fn is_holiday(&self) -> bool {
        matches!(self, Self::Holiday(_))
    }

    /// Start instant for timed events; `None` for anything all-day.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Appointment(EventItem {
                when: EventTime::Timed { start, .. },
                ..
            }) => Some(*start),
            _ => None,
        }
    }
}

/// Display label and hex color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Category {
    pub label: &'static str,
    pub color: &'static str,
}

/// One cell of the month grid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub date_key: String,
    pub in_current_month: bool,
    pub appointments: Vec<CalendarItem>,
    pub holidays: Vec<CalendarItem>,
    /// One entry per distinct category present in the cell.
    pub dots: Vec<Category>,
}
