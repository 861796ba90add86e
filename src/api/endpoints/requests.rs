//! Appointment request endpoints.
//!
//! - `POST /api/requests`: patient proposes a slot
//! - `GET /api/requests`: list, filtered by party and status
//! - `GET /api/requests/:id`: single request
//! - `POST /api/requests/:id/transitions`: negotiate
//! - `GET /api/requests/:id/transitions/allowed`: next statuses for an actor

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::endpoints::run_blocking;
use crate::api::error::ApiError;
use crate::api::types::{
    parse_id, parse_token, AllowedQuery, ApiContext, CreateRequestBody, ListQuery,
    TransitionBody, TransitionCommand,
};
use crate::models::{Actor, AppointmentRequest, NewAppointmentRequest, RequestFilter, RequestStatus};
use crate::negotiation::NegotiationOutcome;

/// `POST /api/requests`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<NegotiationOutcome>), ApiError> {
    let Json(body) = body?;
    let new = NewAppointmentRequest::try_from(body)?;
    let outcome = run_blocking(&ctx, move |core| core.engine().create_request(new)).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Serialize)]
pub struct RequestsResponse {
    pub requests: Vec<AppointmentRequest>,
}

/// `GET /api/requests?patient_id=&doctor_id=&status=`
pub async fn list(
    State(ctx): State<ApiContext>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<RequestsResponse>, ApiError> {
    let Query(query) = query?;
    let filter = RequestFilter::try_from(query)?;
    let requests = run_blocking(&ctx, move |core| core.engine().list_requests(&filter)).await?;
    Ok(Json(RequestsResponse { requests }))
}

/// `GET /api/requests/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(request_id): Path<String>,
) -> Result<Json<AppointmentRequest>, ApiError> {
    let id = parse_id(&request_id)?;
    let request = run_blocking(&ctx, move |core| core.engine().get_request(&id)).await?;
    Ok(Json(request))
}

/// `POST /api/requests/:id/transitions`
///
/// Responds with the stored request, whether anything was written, and any
/// delivery warnings. A repeated transition answers 200 with `applied: false`.
pub async fn transition(
    State(ctx): State<ApiContext>,
    Path(request_id): Path<String>,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Json<NegotiationOutcome>, ApiError> {
    let id = parse_id(&request_id)?;
    let Json(body) = body?;
    let TransitionCommand {
        actor,
        target,
        payload,
    } = TransitionCommand::try_from(body)?;

    let outcome = run_blocking(&ctx, move |core| {
        core.engine().apply_transition(&id, actor, target, payload)
    })
    .await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct AllowedResponse {
    pub actor: Actor,
    pub current_status: RequestStatus,
    pub allowed: Vec<RequestStatus>,
}

/// `GET /api/requests/:id/transitions/allowed?actor=`
pub async fn allowed(
    State(ctx): State<ApiContext>,
    Path(request_id): Path<String>,
    query: Result<Query<AllowedQuery>, QueryRejection>,
) -> Result<Json<AllowedResponse>, ApiError> {
    let id = parse_id(&request_id)?;
    let Query(query) = query?;
    let actor = parse_token::<Actor>("actor", &query.actor)?;

    let (current_status, allowed) = run_blocking(&ctx, move |core| {
        let request = core.engine().get_request(&id)?;
        let allowed = core.engine().allowed_transitions(&id, actor)?;
        Ok((request.status, allowed))
    })
    .await?;

    Ok(Json(AllowedResponse {
        actor,
        current_status,
        allowed,
    }))
}
