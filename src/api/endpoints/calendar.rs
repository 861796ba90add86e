//! Month view endpoint.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, MonthBody};
use crate::calendar::{month_view, MonthView};

/// `POST /api/calendar/month`: bucket the supplied items into the month
/// grid around `anchorDate`. Pure computation; nothing is read from storage.
pub async fn month(
    State(ctx): State<ApiContext>,
    body: Result<Json<MonthBody>, JsonRejection>,
) -> Result<Json<MonthView>, ApiError> {
    let Json(body) = body?;
    let anchor = body.anchor()?;
    let options = ctx
        .core
        .month_options(body.tz()?, body.weekday()?, body.include_holidays);

    tracing::debug!(
        anchor = %anchor,
        items = body.items.len(),
        time_zone = %options.time_zone,
        "Building month view"
    );
    Ok(Json(month_view(anchor, &body.items, &options)?))
}
