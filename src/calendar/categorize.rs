//! Display category for a calendar item.
//!
//! First match wins: explicit tag, cancelled status, title keyword,
//! numeric color id, then the generic `Event` fallback.

use super::types::{CalendarItem, Category, EventItem};
use crate::models::CategoryTag;

pub const APPOINTMENT: Category = Category {
    label: "Appointment",
    color: "#4285f4",
};
pub const TASK: Category = Category {
    label: "Task",
    color: "#0f9d58",
};
pub const PERSONAL: Category = Category {
    label: "Personal",
    color: "#9c27b0",
};
pub const HOLIDAY: Category = Category {
    label: "Holiday",
    color: "#db4437",
};
pub const CANCELLED: Category = Category {
    label: "Cancelled",
    color: "#9e9e9e",
};
pub const EVENT: Category = Category {
    label: "Event",
    color: "#039be5",
};

/// Colors for numeric color ids 1..=11. The order is part of the contract.
pub const COLOR_ID_PALETTE: [&str; 11] = [
    "#7986cb", "#33b679", "#8e24aa", "#e67c73", "#f6bf26", "#f4511e", "#039be5", "#616161",
    "#3f51b5", "#0b8043", "#d50000",
];

/// Title keywords, checked in order.
const KEYWORDS: [(&str, Category); 6] = [
    ("todo", TASK),
    ("task", TASK),
    ("visit", APPOINTMENT),
    ("consult", APPOINTMENT),
    ("appointment", APPOINTMENT),
    ("holiday", HOLIDAY),
];

pub fn for_tag(tag: CategoryTag) -> Category {
    match tag {
        CategoryTag::Appointment => APPOINTMENT,
        CategoryTag::Task => TASK,
        CategoryTag::Personal => PERSONAL,
        CategoryTag::Holiday => HOLIDAY,
    }
}

/// Palette entry for a color id; ids wrap around the palette.
pub fn for_color_id(color_id: u32) -> Category {
    let len = COLOR_ID_PALETTE.len() as i64;
    let idx = (i64::from(color_id) - 1).rem_euclid(len) as usize;
    Category {
        label: EVENT.label,
        color: COLOR_ID_PALETTE[idx],
    }
}

pub fn categorize(item: &CalendarItem) -> Category {
    match item {
        CalendarItem::Holiday(_) => HOLIDAY,
        CalendarItem::Appointment(event) => categorize_event(event),
    }
}

pub fn categorize_event(event: &EventItem) -> Category {
    if let Some(tag) = event.category {
        return for_tag(tag);
    }

    if event
        .status
        .as_deref()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("cancelled"))
    {
        return CANCELLED;
    }

    let title = event.title.to_lowercase();
    if let Some((_, category)) = KEYWORDS.iter().find(|(kw, _)| title.contains(kw)) {
        return *category;
    }

    match event.color_id {
        Some(color_id) => for_color_id(color_id),
        None => EVENT,
    }
}
