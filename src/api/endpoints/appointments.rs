//! Appointment lookup.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::endpoints::run_blocking;
use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext};
use crate::models::Appointment;

/// `GET /api/appointments/:id`: the booking produced by an accepted or
/// confirmed request. Cancelled bookings stay readable.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Appointment>, ApiError> {
    let id = parse_id(&appointment_id)?;
    let appointment = run_blocking(&ctx, move |core| core.engine().get_appointment(&id)).await?;
    Ok(Json(appointment))
}
