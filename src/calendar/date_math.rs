//! Month-grid bounds and day-key normalization.
//!
//! Grid arithmetic is checked: dates near the ends of chrono's range yield
//! `None` instead of overflowing.

use chrono::{
    DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::Serialize;

use super::types::{CalendarItem, EventTime};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Years a month view may be anchored in.
pub const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// The month being shown and the whole weeks that frame it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGridBounds {
    pub first_of_month: NaiveDate,
    pub last_of_month: NaiveDate,
    pub grid_start: NaiveDate,
    pub grid_end: NaiveDate,
}

impl MonthGridBounds {
    /// Number of cells; always a multiple of 7.
    pub fn len_days(&self) -> usize {
        ((self.grid_end - self.grid_start).num_days() + 1) as usize
    }

    /// Grid offset of `date`, if it falls inside the grid.
    pub fn offset_of(&self, date: NaiveDate) -> Option<usize> {
        if date < self.grid_start || date > self.grid_end {
            return None;
        }
        Some((date - self.grid_start).num_days() as usize)
    }

    pub fn in_month(&self, date: NaiveDate) -> bool {
        date >= self.first_of_month && date <= self.last_of_month
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        self.grid_start.iter_days().take(self.len_days())
    }
}

/// UTC instants bounding a viewer-local span, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UtcRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Grid bounds for the month containing `anchor`, with weeks starting on
/// `week_start`. `None` when the padded grid leaves chrono's date range.
pub fn month_grid_bounds(anchor: NaiveDate, week_start: Weekday) -> Option<MonthGridBounds> {
    let first_of_month = anchor.with_day(1)?;
    let last_of_month = first_of_month
        .checked_add_months(Months::new(1))?
        .pred_opt()?;

    let start_idx = week_start.num_days_from_monday();
    let end_idx = week_start.pred().num_days_from_monday();

    let lead = (first_of_month.weekday().num_days_from_monday() + 7 - start_idx) % 7;
    let trail = (end_idx + 7 - last_of_month.weekday().num_days_from_monday()) % 7;

    Some(MonthGridBounds {
        first_of_month,
        last_of_month,
        grid_start: first_of_month.checked_sub_days(Days::new(u64::from(lead)))?,
        grid_end: last_of_month.checked_add_days(Days::new(u64::from(trail)))?,
    })
}

/// Canonical `YYYY-MM-DD` key.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// The viewer-local calendar date an item belongs to.
///
/// `None` when shifting a timed start into `tz` leaves chrono's range.
pub fn item_date(item: &CalendarItem, tz: &Tz) -> Option<NaiveDate> {
    match item {
        CalendarItem::Holiday(holiday) => Some(holiday.date),
        CalendarItem::Appointment(event) => match event.when {
            EventTime::AllDay { date } => Some(date),
            EventTime::Timed { start, .. } => {
                let utc = start.naive_utc();
                let offset = tz.offset_from_utc_datetime(&utc).fix().local_minus_utc();
                utc.checked_add_signed(Duration::seconds(i64::from(offset)))
                    .map(|local| local.date())
            }
        },
    }
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// 23:59:59.999 on `date`.
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN - Duration::milliseconds(1))
}

/// Inclusive UTC range covering `date` as seen in `tz`.
pub fn day_range_utc(date: NaiveDate, tz: &Tz) -> UtcRange {
    UtcRange {
        start: resolve_local(tz, start_of_day(date)),
        end: resolve_local(tz, end_of_day(date)),
    }
}

/// Inclusive UTC range covering every cell of the grid; the window a
/// caller should fetch feed events for.
pub fn month_query_range(bounds: &MonthGridBounds, tz: &Tz) -> UtcRange {
    UtcRange {
        start: day_range_utc(bounds.grid_start, tz).start,
        end: day_range_utc(bounds.grid_end, tz).end,
    }
}

/// Local wall-clock time to UTC. Ambiguous times take the earlier instant;
/// times inside a DST gap move forward past the gap.
fn resolve_local(tz: &Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    if let Some(dt) = naive
        .checked_add_signed(Duration::hours(1))
        .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
    {
        tracing::debug!(%naive, %tz, "Local time falls in a DST gap; shifted forward");
        return dt.with_timezone(&Utc);
    }
    tracing::warn!(%naive, %tz, "Could not resolve local time; treating as UTC");
    Utc.from_utc_datetime(&naive)
}
