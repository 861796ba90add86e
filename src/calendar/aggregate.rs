//! Month view assembly.
//!
//! Items are bucketed into grid cells by viewer-local date in a single
//! pass. Holidays and everything else land in separate buckets; each cell
//! also carries a deduplicated list of category dots.

use chrono::{NaiveDate, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use super::categorize::categorize;
use super::date_math::{
    date_key, item_date, month_grid_bounds, month_query_range, MonthGridBounds, UtcRange,
};
use super::types::{CalendarDay, CalendarItem, Category};
use super::CalendarError;

#[derive(Debug, Clone)]
pub struct MonthOptions {
    pub week_start: Weekday,
    pub time_zone: Tz,
    pub include_holidays: bool,
}

impl Default for MonthOptions {
    fn default() -> Self {
        Self {
            week_start: Weekday::Sun,
            time_zone: Tz::UTC,
            include_holidays: true,
        }
    }
}

/// Number of in-month items per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub label: &'static str,
    pub color: &'static str,
    pub count: usize,
}

/// Everything a month screen needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthView {
    pub bounds: MonthGridBounds,
    /// UTC window covering the whole grid in the viewer's time zone.
    pub query_range: UtcRange,
    pub days: Vec<CalendarDay>,
    pub summary: Vec<CategoryCount>,
}

#[derive(Default)]
struct Bucket {
    appointments: Vec<CalendarItem>,
    holidays: Vec<CalendarItem>,
}

fn grid_for(anchor: NaiveDate, week_start: Weekday) -> Result<MonthGridBounds, CalendarError> {
    month_grid_bounds(anchor, week_start).ok_or(CalendarError::AnchorOutOfRange(anchor))
}

/// One `CalendarDay` per grid cell for the month containing `anchor`.
///
/// Fails only when the grid itself cannot be represented; items whose
/// local date cannot be computed are skipped.
pub fn build_month(
    anchor: NaiveDate,
    items: &[CalendarItem],
    options: &MonthOptions,
) -> Result<Vec<CalendarDay>, CalendarError> {
    let bounds = grid_for(anchor, options.week_start)?;
    Ok(fill_grid(&bounds, items, options))
}

fn fill_grid(
    bounds: &MonthGridBounds,
    items: &[CalendarItem],
    options: &MonthOptions,
) -> Vec<CalendarDay> {
    let mut buckets: Vec<Bucket> = (0..bounds.len_days()).map(|_| Bucket::default()).collect();

    for item in items {
        if item.is_holiday() && !options.include_holidays {
            continue;
        }
        let Some(date) = item_date(item, &options.time_zone) else {
            tracing::debug!(
                item_id = item.id(),
                time_zone = %options.time_zone,
                "Calendar item date out of range"
            );
            continue;
        };
        let Some(offset) = bounds.offset_of(date) else {
            tracing::debug!(item_id = item.id(), date = %date, "Calendar item outside month grid");
            continue;
        };
        let bucket = &mut buckets[offset];
        if item.is_holiday() {
            bucket.holidays.push(item.clone());
        } else {
            bucket.appointments.push(item.clone());
        }
    }

    bounds
        .days()
        .zip(buckets)
        .map(|(date, mut bucket)| {
            // Stable: all-day items first, then by start, ties keep input order.
            bucket.appointments.sort_by_key(|item| (item.start().is_some(), item.start()));
            let dots = dedup_dots(bucket.appointments.iter().chain(&bucket.holidays));
            CalendarDay {
                date,
                date_key: date_key(date),
                in_current_month: bounds.in_month(date),
                appointments: bucket.appointments,
                holidays: bucket.holidays,
                dots,
            }
        })
        .collect()
}

fn dedup_dots<'a>(items: impl Iterator<Item = &'a CalendarItem>) -> Vec<Category> {
    let mut dots: Vec<Category> = Vec::new();
    for category in items.map(categorize) {
        if !dots.contains(&category) {
            dots.push(category);
        }
    }
    dots
}

/// Per-category item counts over in-month days, in order of first appearance.
pub fn month_summary(days: &[CalendarDay]) -> Vec<CategoryCount> {
    let mut summary: Vec<CategoryCount> = Vec::new();
    let items = days
        .iter()
        .filter(|day| day.in_current_month)
        .flat_map(|day| day.appointments.iter().chain(&day.holidays));
    for item in items {
        let category = categorize(item);
        match summary
            .iter_mut()
            .find(|c| c.label == category.label && c.color == category.color)
        {
            Some(entry) => entry.count += 1,
            None => summary.push(CategoryCount {
                label: category.label,
                color: category.color,
                count: 1,
            }),
        }
    }
    summary
}

/// Grid, cells and summary in one call.
pub fn month_view(
    anchor: NaiveDate,
    items: &[CalendarItem],
    options: &MonthOptions,
) -> Result<MonthView, CalendarError> {
    let bounds = grid_for(anchor, options.week_start)?;
    let days = fill_grid(&bounds, items, options);
    let summary = month_summary(&days);
    Ok(MonthView {
        query_range: month_query_range(&bounds, &options.time_zone),
        bounds,
        days,
        summary,
    })
}
