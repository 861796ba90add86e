//! Calendar month view.
//!
//! Pure functions: no storage, no clock. Callers supply the items (confirmed
//! appointments, feed events, holidays) and the viewer's time zone.
//!
//! `month_view` also reports the UTC window of the grid (`queryRange`) so a
//! caller knows which feed events to fetch. `day_range_utc` gives the same
//! window for a single day and is used by library callers only.

pub mod aggregate;
pub mod categorize;
pub mod date_math;
pub mod types;

pub use aggregate::{build_month, month_summary, month_view, CategoryCount, MonthOptions, MonthView};
pub use categorize::categorize;
pub use date_math::{
    date_key, day_range_utc, end_of_day, item_date, month_grid_bounds, month_query_range,
    start_of_day, MonthGridBounds, UtcRange, SUPPORTED_YEARS,
};
pub use types::{CalendarDay, CalendarItem, Category, EventItem, EventTime, HolidayItem};

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("No month grid can be built around {0}")]
    AnchorOutOfRange(NaiveDate),
}
